//! Service wiring and request handling

use anyhow::{Context, Result};
use nextup_api::{
    Command, ErrorInfo, Event, Response, ResponsePayload, ServiceEvent,
    ServiceEventPayload, ServiceStatus, API_VERSION,
};
use nextup_config::SchedulerConfig;
use nextup_core::{
    events_on, select_next, CoreEvent, NotificationScheduler, RefreshCoordinator, RefreshHost,
    SchedulerHost, SnapshotCell,
};
use nextup_host_api::{
    AtomicPreferences, CredentialSource, NotificationSink, Preferences, RemoteFetcher,
    TimerFired, TimerSubstrate,
};
use nextup_ipc::{IpcServer, ServerMessage};
use nextup_store::TimetableCache;
use nextup_util::{ClientId, Clock};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Everything the service is assembled from
pub struct ServiceParts {
    pub cache: Arc<dyn TimetableCache>,
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub credentials: Arc<dyn CredentialSource>,
    pub sink: Arc<dyn NotificationSink>,
    pub timer: Arc<dyn TimerSubstrate>,
    pub preferences: Arc<AtomicPreferences>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: SchedulerConfig,
    pub fetch_timeout: Duration,
}

/// Receivers the main loop drains
pub struct ServiceChannels {
    pub timer: mpsc::UnboundedReceiver<TimerFired>,
    pub core: mpsc::UnboundedReceiver<CoreEvent>,
}

/// Main service state
pub struct Service {
    snapshot: Arc<SnapshotCell>,
    scheduler: Arc<NotificationScheduler>,
    coordinator: Arc<RefreshCoordinator>,
    preferences: Arc<AtomicPreferences>,
    clock: Arc<dyn Clock>,
}

impl Service {
    pub fn new(parts: ServiceParts) -> (Arc<Self>, ServiceChannels) {
        // An unreadable cache is treated like an empty one so a refresh can repair it
        let cached = match parts.cache.retrieve() {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Failed to read timetable cache");
                None
            }
        };

        match &cached {
            Some(snapshot) => info!(
                written_at = %snapshot.written_at,
                event_count = snapshot.timetable.len(),
                "Cached timetable loaded"
            ),
            None => info!("Timetable cache is empty"),
        }

        let snapshot = Arc::new(SnapshotCell::from_cached(cached));
        let (core_tx, core_rx) = mpsc::unbounded_channel();
        let timer_rx = parts.timer.subscribe();

        let scheduler = Arc::new(NotificationScheduler::new(
            SchedulerHost {
                timer: parts.timer,
                sink: parts.sink,
                preferences: parts.preferences.clone(),
                clock: parts.clock.clone(),
            },
            snapshot.clone(),
            parts.scheduler,
            core_tx.clone(),
        ));

        let coordinator = Arc::new(RefreshCoordinator::new(
            RefreshHost {
                fetcher: parts.fetcher,
                credentials: parts.credentials,
                cache: parts.cache,
            },
            snapshot.clone(),
            scheduler.clone(),
            parts.fetch_timeout,
            core_tx,
        ));

        let service = Arc::new(Self {
            snapshot,
            scheduler,
            coordinator,
            preferences: parts.preferences,
            clock: parts.clock,
        });

        (
            service,
            ServiceChannels {
                timer: timer_rx,
                core: core_rx,
            },
        )
    }

    pub fn scheduler(&self) -> &Arc<NotificationScheduler> {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn snapshot(&self) -> &Arc<SnapshotCell> {
        &self.snapshot
    }

    /// Startup triggers: kick the scheduler and fill an empty cache
    pub fn start(self: &Arc<Self>) {
        self.scheduler.kick_now();

        if !self.snapshot.is_populated() {
            info!("No cached timetable, refreshing");
            let service = self.clone();
            tokio::spawn(async move {
                let _ = service.coordinator.refresh().await;
            });
        }
    }

    /// Run until `shutdown` resolves
    pub async fn run(
        self: Arc<Self>,
        ipc: Arc<IpcServer>,
        channels: ServiceChannels,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        let accept_task = tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        self.start();

        let ServiceChannels {
            timer: mut timer_events,
            core: mut core_events,
        } = channels;
        tokio::pin!(shutdown);

        info!("Service running");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }

                Some(fired) = timer_events.recv() => {
                    self.scheduler.on_fire(fired.handle);
                }

                Some(event) = core_events.recv() => {
                    Self::handle_core_event(&ipc, event);
                }

                Some(msg) = ipc_messages.recv() => {
                    self.handle_ipc_message(&ipc, msg);
                }
            }
        }

        accept_task.abort();
        self.scheduler.cancel();

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_core_event(ipc: &Arc<IpcServer>, event: CoreEvent) {
        if let CoreEvent::Rearmed { timer, delay, due_at } = &event {
            debug!(timer = %timer, delay_secs = delay.as_secs(), due_at = %due_at, "Scheduler rearmed");
        }

        if let Some(payload) = service_event_payload(&event) {
            ipc.broadcast_event(ServiceEvent::new(payload));
        }
    }

    fn handle_ipc_message(self: &Arc<Self>, ipc: &Arc<IpcServer>, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                // Refresh may take a while; never block the main loop on a request
                let service = self.clone();
                let ipc = ipc.clone();
                tokio::spawn(async move {
                    let response = service
                        .handle_command(&client_id, request.request_id, request.command)
                        .await;
                    if let Err(e) = ipc.send_response(&client_id, response).await {
                        debug!(client_id = %client_id, error = %e, "Client gone before response");
                    }
                });
            }

            ServerMessage::ClientConnected { client_id, uid } => {
                info!(client_id = %client_id, uid = ?uid, "Client connected");
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
            }
        }
    }

    /// Answer one control command
    pub async fn handle_command(
        &self,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        match command {
            Command::GetStatus => Response::success(request_id, ResponsePayload::Status(self.status())),

            Command::GetTimetable { day } => {
                let snapshot = self.snapshot.load();
                let include_cancelled = self.preferences.show_cancelled();

                let events: Vec<Event> = match (&snapshot, day) {
                    (None, _) => Vec::new(),
                    (Some(s), Some(day)) => events_on(day, &s.timetable, include_cancelled)
                        .into_iter()
                        .cloned()
                        .collect(),
                    (Some(s), None) => s
                        .timetable
                        .sorted_by_start()
                        .into_iter()
                        .filter(|e| include_cancelled || !e.cancelled)
                        .cloned()
                        .collect(),
                };

                Response::success(
                    request_id,
                    ResponsePayload::Timetable {
                        written_at: snapshot.map(|s| s.written_at),
                        events,
                    },
                )
            }

            Command::GetNext => {
                let now = self.clock.now();
                let event = self.snapshot.load().and_then(|s| {
                    select_next(now, &s.timetable, self.preferences.show_cancelled()).cloned()
                });
                Response::success(request_id, ResponsePayload::Next { event })
            }

            Command::Refresh => match self.coordinator.refresh().await {
                Ok(snapshot) => Response::success(
                    request_id,
                    ResponsePayload::Refreshed {
                        written_at: snapshot.written_at,
                        event_count: snapshot.timetable.len(),
                    },
                ),
                Err(e) => Response::error(request_id, ErrorInfo::new(e.code(), e.to_string())),
            },

            Command::SetEnabled { enabled } => {
                self.set_enabled(enabled);
                Response::success(request_id, ResponsePayload::EnabledChanged { enabled })
            }

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }

    /// Toggle the notification; enabling kicks the scheduler, disabling tears it down
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.preferences.set_notifications_enabled(enabled);
        if previous != enabled {
            info!(enabled, "Notifications toggled");
        }

        if enabled {
            self.scheduler.kick_now();
        } else {
            self.scheduler.cancel();
        }
    }

    pub fn status(&self) -> ServiceStatus {
        let snapshot = self.snapshot.load();
        ServiceStatus {
            api_version: API_VERSION,
            cache_populated: snapshot.is_some(),
            snapshot_written_at: snapshot.as_ref().map(|s| s.written_at),
            event_count: snapshot.as_ref().map(|s| s.timetable.len()).unwrap_or(0),
            refresh_in_flight: self.coordinator.is_in_flight(),
            scheduler: self.scheduler.status(),
        }
    }
}

/// Client-facing form of a core event, if clients care about it
pub fn service_event_payload(event: &CoreEvent) -> Option<ServiceEventPayload> {
    match event {
        CoreEvent::SnapshotReplaced {
            written_at,
            event_count,
        } => Some(ServiceEventPayload::SnapshotReplaced {
            written_at: *written_at,
            event_count: *event_count,
        }),
        CoreEvent::RefreshFailed { error } => Some(ServiceEventPayload::RefreshFailed {
            code: error.code(),
            message: error.to_string(),
        }),
        CoreEvent::NotificationIssued { event, next_wake } => {
            Some(ServiceEventPayload::NotificationIssued {
                event: event.clone(),
                next_wake: *next_wake,
            })
        }
        CoreEvent::NotificationCleared { next_wake } => {
            Some(ServiceEventPayload::NotificationCleared {
                next_wake: *next_wake,
            })
        }
        CoreEvent::SchedulerStopped => {
            Some(ServiceEventPayload::NotificationCleared { next_wake: None })
        }
        CoreEvent::Rearmed { .. } => None,
    }
}

