//! Restart supervision for the capture service.
//!
//! The supervisor builds a fresh [`CaptureService`] for each run, restarts it
//! with growing delays after abnormal exits (errors and panics alike), and
//! stops only when the shared shutdown token is cancelled.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backoff::Backoff;
use crate::logging::{Glyph, Icons};
use crate::service::{CaptureService, ServiceError, ServiceStats};

/// Builds service instances for the supervisor.
pub trait ServiceFactory {
    /// Create a stopped service that carries `restart_count` and observes
    /// `shutdown`.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be built; the supervisor treats
    /// this like any other abnormal exit.
    fn create(
        &mut self,
        restart_count: u32,
        shutdown: CancellationToken,
    ) -> Result<CaptureService, ServiceError>;
}

impl<F> ServiceFactory for F
where
    F: FnMut(u32, CancellationToken) -> Result<CaptureService, ServiceError>,
{
    fn create(
        &mut self,
        restart_count: u32,
        shutdown: CancellationToken,
    ) -> Result<CaptureService, ServiceError> {
        self(restart_count, shutdown)
    }
}

/// What the supervisor saw when it returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorReport {
    /// Abnormal exits over the supervisor's lifetime.
    pub restart_count: u32,
    /// Statistics of the instance that was stopped gracefully, if any.
    pub final_stats: Option<ServiceStats>,
}

enum InstanceExit {
    Graceful(Option<ServiceStats>),
    Abnormal(String),
}

/// Keeps a capture service running until shutdown is requested.
pub struct Supervisor<F> {
    factory: F,
    shutdown: CancellationToken,
    restart_backoff: Backoff,
    restart_count: u32,
    icons: Icons,
}

impl<F> std::fmt::Debug for Supervisor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("restart_backoff", &self.restart_backoff)
            .field("restart_count", &self.restart_count)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<F: ServiceFactory> Supervisor<F> {
    /// Create a supervisor.
    #[must_use]
    pub fn new(
        factory: F,
        shutdown: CancellationToken,
        restart_backoff: Backoff,
        icons: Icons,
    ) -> Self {
        Self {
            factory,
            shutdown,
            restart_backoff,
            restart_count: 0,
            icons,
        }
    }

    /// Run service instances until shutdown.
    ///
    /// Never fails: every service-level fault becomes a restart.
    pub async fn run(mut self) -> SupervisorReport {
        info!("{} Supervisor started", self.icons.get(Glyph::Guard));
        let mut final_stats = None;

        while !self.shutdown.is_cancelled() {
            match self.run_instance().await {
                InstanceExit::Graceful(stats) => {
                    final_stats = stats;
                    break;
                }
                InstanceExit::Abnormal(reason) => {
                    self.restart_count += 1;
                    let delay = self.restart_backoff.next_delay();
                    warn!(
                        "{} Service exited abnormally: {}. Restart #{} in {:.1}s",
                        self.icons.get(Glyph::Restart),
                        reason,
                        self.restart_count,
                        delay.as_secs_f64()
                    );
                    tokio::select! {
                        () = self.shutdown.cancelled() => {
                            info!("Shutdown requested during restart delay");
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(
            "{} Supervisor stopped after {} restart(s)",
            self.icons.get(Glyph::Guard),
            self.restart_count
        );
        SupervisorReport {
            restart_count: self.restart_count,
            final_stats,
        }
    }

    async fn run_instance(&mut self) -> InstanceExit {
        let service = match self
            .factory
            .create(self.restart_count, self.shutdown.clone())
        {
            Ok(service) => service,
            Err(e) => {
                error!(
                    "{} Could not create capture service: {}",
                    self.icons.get(Glyph::Error),
                    e
                );
                return InstanceExit::Abnormal(e.to_string());
            }
        };

        let lifecycle = drive(
            service,
            &self.shutdown,
            &mut self.restart_backoff,
            self.icons,
        );
        match AssertUnwindSafe(lifecycle).catch_unwind().await {
            Ok(exit) => exit,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    "{} Capture service panicked: {}",
                    self.icons.get(Glyph::Crash),
                    message
                );
                InstanceExit::Abnormal(format!("panic: {message}"))
            }
        }
    }
}

/// Start and run one instance, then stop it.
async fn drive(
    mut service: CaptureService,
    shutdown: &CancellationToken,
    restart_backoff: &mut Backoff,
    icons: Icons,
) -> InstanceExit {
    if let Err(e) = service.start().await {
        if shutdown.is_cancelled() {
            return InstanceExit::Graceful(service.stop(true).await);
        }
        return InstanceExit::Abnormal(e.to_string());
    }
    restart_backoff.reset();

    match service.run_forever().await {
        Ok(()) => InstanceExit::Graceful(service.stop(true).await),
        Err(e) => {
            error!("{} Capture service failed: {}", icons.get(Glyph::Error), e);
            service.stop(false).await;
            InstanceExit::Abnormal(e.to_string())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::capture::CaptureSource;
    use crate::error::Error;
    use crate::testing::{
        build_service, build_service_with, FakeSource, FakeStore, FakeTriggers, CAPTURE, STOP,
    };

    struct Harness {
        store: FakeStore,
        source: FakeSource,
        triggers: FakeTriggers,
        shutdown: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let store = FakeStore::new();
            store.set_reachable("primary", true);
            Self {
                store,
                source: FakeSource::new(),
                triggers: FakeTriggers::new(),
                shutdown: CancellationToken::new(),
            }
        }

        fn factory(
            &self,
        ) -> impl FnMut(u32, CancellationToken) -> Result<CaptureService, ServiceError> {
            let store = self.store.clone();
            let source = self.source.clone();
            let triggers = self.triggers.clone();
            move |restart_count: u32, shutdown: CancellationToken| {
                Ok(build_service(
                    &store,
                    &source,
                    &triggers,
                    &["primary"],
                    shutdown,
                    restart_count,
                ))
            }
        }

        fn supervisor<F: ServiceFactory>(&self, factory: F) -> Supervisor<F> {
            Supervisor::new(
                factory,
                self.shutdown.clone(),
                Backoff::new(Duration::from_secs(5), Duration::from_secs(60), 1.5),
                Icons::ascii(),
            )
        }
    }

    struct PanickingSource;

    impl CaptureSource for PanickingSource {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn read_raw(&self) -> Result<Option<String>, Error> {
            panic!("clipboard backend crashed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_trigger_ends_supervision() {
        let h = Harness::new();
        h.source.push_text("hello");
        let supervisor = h.supervisor(h.factory());

        let triggers = h.triggers.clone();
        let driver = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            triggers.fire(CAPTURE);
            tokio::time::sleep(Duration::from_millis(10)).await;
            triggers.fire(STOP);
        };
        let (report, ()) = tokio::join!(supervisor.run(), driver);

        assert_eq!(report.restart_count, 0);
        let stats = report.final_stats.unwrap();
        assert_eq!(stats.captures, 1);
        assert_eq!(stats.successful_inserts, 1);
        assert!(h.triggers.registered().is_empty());
        assert_eq!(h.store.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancel_stops_gracefully() {
        let h = Harness::new();
        let supervisor = h.supervisor(h.factory());

        let shutdown = h.shutdown.clone();
        let driver = async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            shutdown.cancel();
        };
        let (report, ()) = tokio::join!(supervisor.run(), driver);

        assert_eq!(report.restart_count, 0);
        assert!(report.final_stats.unwrap().start_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_carries_count_and_resets_counters() {
        let h = Harness::new();
        h.source.push_text("first");
        h.source.push_text("second");
        let mut build = h.factory();
        let triggers = h.triggers.clone();
        let factory = move |restart_count: u32, shutdown: CancellationToken| {
            if restart_count > 0 {
                triggers.set_failing(false);
            }
            build(restart_count, shutdown)
        };
        let supervisor = h.supervisor(factory);

        let triggers = h.triggers.clone();
        let driver = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            triggers.fire(CAPTURE);
            tokio::time::sleep(Duration::from_millis(10)).await;
            // Lost hooks that cannot come back end the first instance
            triggers.set_failing(true);
            triggers.drop_registrations();
            tokio::time::sleep(Duration::from_secs(10)).await;
            triggers.fire(CAPTURE);
            tokio::time::sleep(Duration::from_millis(10)).await;
            triggers.fire(STOP);
        };
        let (report, ()) = tokio::join!(supervisor.run(), driver);

        assert_eq!(report.restart_count, 1);
        let stats = report.final_stats.unwrap();
        assert_eq!(stats.restart_count, 1);
        assert_eq!(stats.captures, 1);
        assert_eq!(stats.successful_inserts, 1);
        assert_eq!(h.store.inserted(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_delays_grow() {
        let h = Harness::new();
        h.triggers.set_failing(true);
        let supervisor = h.supervisor(h.factory());

        let shutdown = h.shutdown.clone();
        let driver = async {
            // Starts fail at 0s, 5s and 12.5s; the next would be at 23.75s
            tokio::time::sleep(Duration::from_secs(20)).await;
            shutdown.cancel();
        };
        let started = tokio::time::Instant::now();
        let (report, ()) = tokio::join!(supervisor.run(), driver);

        assert_eq!(report.restart_count, 3);
        assert!(report.final_stats.is_none());
        assert_eq!(h.triggers.register_calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_factory_errors_are_restarted() {
        let h = Harness::new();
        let mut build = h.factory();
        let factory = move |restart_count: u32, shutdown: CancellationToken| {
            if restart_count == 0 {
                return Err(ServiceError::StoreUnavailable);
            }
            build(restart_count, shutdown)
        };
        let supervisor = h.supervisor(factory);

        let triggers = h.triggers.clone();
        let driver = async {
            tokio::time::sleep(Duration::from_secs(6)).await;
            triggers.fire(STOP);
        };
        let (report, ()) = tokio::join!(supervisor.run(), driver);

        assert_eq!(report.restart_count, 1);
        assert_eq!(report.final_stats.unwrap().restart_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_an_abnormal_exit() {
        let h = Harness::new();
        let store = h.store.clone();
        let triggers = h.triggers.clone();
        let factory = move |restart_count: u32, shutdown: CancellationToken| {
            let source: Box<dyn CaptureSource> = if restart_count == 0 {
                Box::new(PanickingSource)
            } else {
                Box::new(FakeSource::new())
            };
            Ok(build_service_with(
                &store,
                source,
                &triggers,
                &["primary"],
                shutdown,
                restart_count,
            ))
        };
        let supervisor = h.supervisor(factory);

        let triggers = h.triggers.clone();
        let driver = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            triggers.fire(CAPTURE);
            tokio::time::sleep(Duration::from_secs(6)).await;
            triggers.fire(STOP);
        };
        let (report, ()) = tokio::join!(supervisor.run(), driver);

        assert_eq!(report.restart_count, 1);
        assert_eq!(report.final_stats.unwrap().restart_count, 1);
        assert_eq!(h.store.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_startup_backoff_is_graceful() {
        let h = Harness::new();
        h.store.set_reachable("primary", false);
        let supervisor = h.supervisor(h.factory());

        let shutdown = h.shutdown.clone();
        let driver = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            shutdown.cancel();
        };
        let (report, ()) = tokio::join!(supervisor.run(), driver);

        assert_eq!(report.restart_count, 0);
        let stats = report.final_stats.unwrap();
        assert!(stats.start_time.is_none());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
