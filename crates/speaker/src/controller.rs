//! Playback Controller
//!
//! A background task that reconciles the desired audio URI against what the
//! speaker is actually playing, once per interval.
//!
//! Per tick:
//! 1. A device that is not its group's coordinator is replaced by a freshly
//!    connected one and the tick ends there
//! 2. Nothing is desired: nothing to do
//! 3. The current track differs from the desired URI and that URI was not
//!    already triggered: clear the queue, enqueue the desired URI and the end
//!    jingle, play from the top, remember the URI as triggered
//!
//! A failing device call abandons the tick; the next tick starts over.

use crate::device::{DeviceConnector, PlaybackDevice};
use crate::songs::SongBook;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics::{DEVICE_RECONNECTS, PLAYBACK_TICKS, PLAYBACK_TRIGGERS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// What a single reconciliation tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The device was not coordinator and has been replaced
    Reconnected,
    /// No audio is desired
    Idle,
    /// Desired audio is playing or was already triggered
    Settled,
    /// The trigger sequence was issued for this URI
    Triggered(String),
    /// A device call failed; retried next tick
    Failed,
}

impl TickOutcome {
    fn label(&self) -> &'static str {
        match self {
            TickOutcome::Reconnected => "reconnected",
            TickOutcome::Idle => "idle",
            TickOutcome::Settled => "settled",
            TickOutcome::Triggered(_) => "triggered",
            TickOutcome::Failed => "failed",
        }
    }
}

/// Owns the device connection and the record of what was last triggered
pub struct Reconciler {
    connector: Arc<dyn DeviceConnector>,
    device: Box<dyn PlaybackDevice>,
    desired: watch::Receiver<Option<String>>,
    last_triggered: Arc<watch::Sender<Option<String>>>,
    end_uri: String,
}

impl Reconciler {
    pub async fn tick(&mut self) -> TickOutcome {
        let outcome = match self.try_tick().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Playback tick failed: {:#}", e);
                TickOutcome::Failed
            }
        };

        PLAYBACK_TICKS.with_label_values(&[outcome.label()]).inc();
        outcome
    }

    async fn try_tick(&mut self) -> Result<TickOutcome> {
        if !self.device.is_coordinator().await? {
            // The coordinator flag does not recover on an existing
            // connection, only on a new one
            warn!("Speaker is not the group coordinator, reconnecting");
            self.device = self.connector.connect().await?;
            DEVICE_RECONNECTS.inc();
            return Ok(TickOutcome::Reconnected);
        }

        let Some(desired) = self.desired.borrow().clone() else {
            return Ok(TickOutcome::Idle);
        };

        let track = self.device.get_current_track().await?;
        let already_triggered = self.last_triggered.borrow().as_deref() == Some(desired.as_str());
        if track.uri == desired || already_triggered {
            debug!(uri = %desired, current = %track.uri, "Playback settled");
            return Ok(TickOutcome::Settled);
        }

        self.device.clear_queue().await?;
        self.device.enqueue(&desired).await?;
        self.device.enqueue(&self.end_uri).await?;
        self.device.play_from_queue(0, true).await?;

        info!(uri = %desired, "Triggered playback");
        self.last_triggered.send_replace(Some(desired.clone()));
        PLAYBACK_TRIGGERS.inc();
        Ok(TickOutcome::Triggered(desired))
    }
}

/// Write side of the desired-audio register, shared with the classification
/// flow
///
/// Every write replaces the previous value; the reconciler reads whichever
/// value is current when it ticks.
#[derive(Clone)]
pub struct PlaybackHandle {
    desired: Arc<watch::Sender<Option<String>>>,
    last_triggered: watch::Receiver<Option<String>>,
    songs: Arc<SongBook>,
}

impl PlaybackHandle {
    pub fn play_alarm(&self) {
        self.set_desired(self.songs.alarm_uri().to_string());
    }

    /// Play the person's song, or the alarm when they have none
    pub fn play_for(&self, name: &str) {
        self.set_desired(self.songs.song_for(name).to_string());
    }

    fn set_desired(&self, uri: String) {
        debug!(uri = %uri, "Desired playback updated");
        self.desired.send_replace(Some(uri));
    }

    pub fn desired(&self) -> Option<String> {
        self.desired.borrow().clone()
    }

    pub fn last_triggered(&self) -> Option<String> {
        self.last_triggered.borrow().clone()
    }
}

struct Worker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Lifecycle owner of the reconciliation task
pub struct PlaybackController {
    handle: PlaybackHandle,
    connector: Arc<dyn DeviceConnector>,
    interval: Duration,
    /// Outlives every run so a restart remembers what was triggered
    last_tx: Arc<watch::Sender<Option<String>>>,
    desired_rx: watch::Receiver<Option<String>>,
    worker: Option<Worker>,
}

impl PlaybackController {
    pub fn new(connector: Arc<dyn DeviceConnector>, songs: SongBook) -> Self {
        let (desired_tx, desired_rx) = watch::channel(None);
        let (last_tx, last_rx) = watch::channel(None);

        Self {
            handle: PlaybackHandle {
                desired: Arc::new(desired_tx),
                last_triggered: last_rx,
                songs: Arc::new(songs),
            },
            connector,
            interval: DEFAULT_TICK_INTERVAL,
            last_tx: Arc::new(last_tx),
            desired_rx,
            worker: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// A cloneable handle for setting the desired audio
    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }

    pub fn play_alarm(&self) {
        self.handle.play_alarm();
    }

    pub fn play_for(&self, name: &str) {
        self.handle.play_for(name);
    }

    pub fn desired(&self) -> Option<String> {
        self.handle.desired()
    }

    pub fn last_triggered(&self) -> Option<String> {
        self.handle.last_triggered()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Connect to the device and start ticking in the background
    pub async fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            anyhow::bail!("playback controller is already running");
        }

        let device = self.connector.connect().await?;

        let reconciler = Reconciler {
            connector: self.connector.clone(),
            device,
            desired: self.desired_rx.clone(),
            last_triggered: self.last_tx.clone(),
            end_uri: self.handle.songs.end_uri().to_string(),
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(reconciler, self.interval, cancel.clone()));
        self.worker = Some(Worker { cancel, task });

        info!(interval_ms = self.interval.as_millis() as u64, "Playback controller started");
        Ok(())
    }

    /// Stop ticking; a tick already talking to the device finishes first
    pub async fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        worker.cancel.cancel();
        if let Err(e) = worker.task.await {
            warn!("Playback worker ended abnormally: {}", e);
        }

        info!("Playback controller stopped");
        Ok(())
    }
}

async fn run(mut reconciler: Reconciler, interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                reconciler.tick().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CurrentTrack;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Shared script and command log for every connection a connector hands out
    #[derive(Default)]
    struct Script {
        coordinator: Mutex<VecDeque<bool>>,
        current_uri: Mutex<String>,
        fail_enqueue: Mutex<bool>,
        crash_on_track: Mutex<bool>,
        commands: Mutex<Vec<String>>,
        connections: Mutex<usize>,
    }

    impl Script {
        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }

        fn log(&self, command: String) {
            self.commands.lock().unwrap().push(command);
        }
    }

    struct FakeDevice {
        id: usize,
        script: Arc<Script>,
    }

    #[async_trait]
    impl PlaybackDevice for FakeDevice {
        async fn is_coordinator(&self) -> Result<bool> {
            self.script.log(format!("is_coordinator#{}", self.id));
            Ok(self.script.coordinator.lock().unwrap().pop_front().unwrap_or(true))
        }

        async fn get_current_track(&self) -> Result<CurrentTrack> {
            let crash = *self.script.crash_on_track.lock().unwrap();
            if crash {
                panic!("device driver crashed");
            }
            Ok(CurrentTrack {
                uri: self.script.current_uri.lock().unwrap().clone(),
            })
        }

        async fn clear_queue(&self) -> Result<()> {
            self.script.log("clear".to_string());
            Ok(())
        }

        async fn enqueue(&self, uri: &str) -> Result<()> {
            if *self.script.fail_enqueue.lock().unwrap() {
                anyhow::bail!("device went away");
            }
            self.script.log(format!("enqueue {}", uri));
            Ok(())
        }

        async fn play_from_queue(&self, index: usize, start: bool) -> Result<()> {
            self.script.log(format!("play {} {}", index, start));
            Ok(())
        }
    }

    struct FakeConnector(Arc<Script>);

    #[async_trait]
    impl DeviceConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn PlaybackDevice>> {
            let mut connections = self.0.connections.lock().unwrap();
            *connections += 1;
            Ok(Box::new(FakeDevice {
                id: *connections,
                script: self.0.clone(),
            }))
        }
    }

    fn songs() -> SongBook {
        SongBook::new("http://alarm", "http://end").with_song("alice", "http://alice")
    }

    async fn reconciler(script: &Arc<Script>) -> (Reconciler, PlaybackHandle) {
        let connector: Arc<dyn DeviceConnector> = Arc::new(FakeConnector(script.clone()));
        let controller = PlaybackController::new(connector.clone(), songs());
        let reconciler = Reconciler {
            device: connector.connect().await.unwrap(),
            connector,
            desired: controller.desired_rx.clone(),
            last_triggered: controller.last_tx.clone(),
            end_uri: "http://end".to_string(),
        };
        (reconciler, controller.handle())
    }

    #[tokio::test]
    async fn test_idle_without_desired_audio() {
        let script = Arc::new(Script::default());
        let (mut reconciler, _handle) = reconciler(&script).await;

        assert_eq!(reconciler.tick().await, TickOutcome::Idle);
        assert_eq!(script.commands(), vec!["is_coordinator#1"]);
    }

    #[tokio::test]
    async fn test_trigger_sequence() {
        let script = Arc::new(Script::default());
        let (mut reconciler, handle) = reconciler(&script).await;

        handle.play_for("Alice");
        assert_eq!(
            reconciler.tick().await,
            TickOutcome::Triggered("http://alice".to_string())
        );
        assert_eq!(
            script.commands(),
            vec!["is_coordinator#1", "clear", "enqueue http://alice", "enqueue http://end", "play 0 true"]
        );
        assert_eq!(handle.last_triggered().as_deref(), Some("http://alice"));
    }

    #[tokio::test]
    async fn test_no_retrigger_after_success() {
        let script = Arc::new(Script::default());
        let (mut reconciler, handle) = reconciler(&script).await;

        handle.play_alarm();
        reconciler.tick().await;
        // The alarm finished; the device now plays something else
        *script.current_uri.lock().unwrap() = "http://end".to_string();

        assert_eq!(reconciler.tick().await, TickOutcome::Settled);
        assert_eq!(script.commands().iter().filter(|c| *c == "clear").count(), 1);
    }

    #[tokio::test]
    async fn test_already_playing_is_settled() {
        let script = Arc::new(Script::default());
        *script.current_uri.lock().unwrap() = "http://alarm".to_string();
        let (mut reconciler, handle) = reconciler(&script).await;

        handle.play_alarm();
        assert_eq!(reconciler.tick().await, TickOutcome::Settled);
        assert_eq!(handle.last_triggered(), None);
    }

    #[tokio::test]
    async fn test_reconnects_on_every_non_coordinator_tick() {
        let script = Arc::new(Script::default());
        script.coordinator.lock().unwrap().extend([false, false, false]);
        let (mut reconciler, handle) = reconciler(&script).await;
        handle.play_alarm();

        for _ in 0..3 {
            assert_eq!(reconciler.tick().await, TickOutcome::Reconnected);
        }

        // Each tick asked a different connection object
        assert_eq!(
            script.commands(),
            vec!["is_coordinator#1", "is_coordinator#2", "is_coordinator#3"]
        );
        assert_eq!(*script.connections.lock().unwrap(), 4);

        assert_eq!(
            reconciler.tick().await,
            TickOutcome::Triggered("http://alarm".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_tick_is_retried() {
        let script = Arc::new(Script::default());
        *script.fail_enqueue.lock().unwrap() = true;
        let (mut reconciler, handle) = reconciler(&script).await;
        handle.play_for("bob");

        assert_eq!(reconciler.tick().await, TickOutcome::Failed);
        assert_eq!(handle.last_triggered(), None);

        *script.fail_enqueue.lock().unwrap() = false;
        assert_eq!(
            reconciler.tick().await,
            TickOutcome::Triggered("http://alarm".to_string())
        );
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let script = Arc::new(Script::default());
        let (mut reconciler, handle) = reconciler(&script).await;

        handle.play_alarm();
        handle.play_for("alice");
        assert_eq!(handle.desired().as_deref(), Some("http://alice"));
        assert_eq!(
            reconciler.tick().await,
            TickOutcome::Triggered("http://alice".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_lifecycle() {
        let script = Arc::new(Script::default());
        let mut controller = PlaybackController::new(Arc::new(FakeConnector(script.clone())), songs());

        controller.start().await.unwrap();
        assert!(controller.is_running());
        assert!(controller.start().await.is_err());

        controller.play_for("alice");
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(controller.last_triggered().as_deref(), Some("http://alice"));

        controller.stop().await.unwrap();
        assert!(!controller.is_running());

        // State survives a restart, so the same URI is not triggered again
        controller.start().await.unwrap();
        time::sleep(Duration::from_millis(1500)).await;
        controller.stop().await.unwrap();
        assert_eq!(script.commands().iter().filter(|c| *c == "clear").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_worker_panic() {
        let script = Arc::new(Script::default());
        let mut controller = PlaybackController::new(Arc::new(FakeConnector(script.clone())), songs());

        controller.start().await.unwrap();
        controller.play_for("alice");
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(controller.last_triggered().as_deref(), Some("http://alice"));

        *script.crash_on_track.lock().unwrap() = true;
        controller.play_alarm();
        time::sleep(Duration::from_millis(1500)).await;
        controller.stop().await.unwrap();
        assert_eq!(controller.last_triggered().as_deref(), Some("http://alice"));

        *script.crash_on_track.lock().unwrap() = false;
        controller.start().await.unwrap();
        time::sleep(Duration::from_millis(1500)).await;
        controller.stop().await.unwrap();
        assert_eq!(controller.last_triggered().as_deref(), Some("http://alarm"));
    }
}
