// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{future::Future, net::SocketAddr, time::Duration};

use modbus_session::{prelude::*, transport::tcp::TcpTransport, TransportError};
use tokio::net::TcpListener;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn listen() -> anyhow::Result<(TcpListener, SocketAddr)> {
    let listener = TcpTransport::listen("127.0.0.1:0".parse()?, 8)?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

/// Answer requests on the next accepted connection until the master hangs up.
pub async fn serve(listener: &TcpListener, mapping: Mapping) -> anyhow::Result<Mapping> {
    let transport = TcpTransport::accept(listener).await?;
    let mut session = SlaveSession::new(transport, mapping);
    loop {
        match session.receive().await {
            Ok(_) => {
                session.reply().await?;
            }
            Err(err) if err.is_timeout() => continue,
            Err(Error::Transport(TransportError::Io { .. })) => break,
            Err(err) => return Err(err.into()),
        }
    }
    let (_, mapping) = session.into_parts();
    Ok(mapping)
}

pub async fn connect(addr: SocketAddr) -> anyhow::Result<MasterSession<TcpTransport>> {
    let mut master = MasterSession::new(TcpTransport::new(addr.ip().to_string(), addr.port()));
    master.set_response_timeout(2, 0)?;
    master.connect().await?;
    Ok(master)
}

/// Run a slave and a master side by side, guarded by a watchdog.
pub async fn run<S, C, T>(server: S, client: C) -> anyhow::Result<(Mapping, T)>
where
    S: Future<Output = anyhow::Result<Mapping>>,
    C: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(10)) => {
            panic!("timeout - perhaps we have a lockup")
        }
        res = async { futures::try_join!(server, client) } => res,
    }
}
