//! Process signals translated into supervisor requests.
//!
//! `SIGTERM` and `SIGINT` terminate, `SIGHUP` reloads. Elsewhere only
//! Ctrl-C is recognised.

use tokio::sync::mpsc;
use tracing::info;

use super::Signal;

/// Start forwarding process signals. The listener ends with the receiver.
#[cfg(unix)]
pub fn listen() -> std::io::Result<mpsc::Receiver<Signal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = terminate.recv() => Signal::Terminate,
                _ = interrupt.recv() => Signal::Terminate,
                _ = hangup.recv() => Signal::Reload,
            };
            info!("received {:?} signal", request);
            if tx.send(request).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(not(unix))]
pub fn listen() -> std::io::Result<mpsc::Receiver<Signal>> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt");
            if tx.send(Signal::Terminate).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}
