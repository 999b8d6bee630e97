//! Periodic position reporting for the loaded track.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use super::output::SharedMixer;
use super::state::PlayerEvent;

/// How often a playing track reports its position.
pub(crate) const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Background worker that snapshots playback position once per interval.
///
/// At most one task runs at a time; it is cancelled and joined before the
/// next track's task starts, so subscribers never see interleaved
/// reports from two tracks.
pub(crate) struct ProgressTask {
    cancel_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressTask {
    pub(crate) fn spawn(
        mixer: SharedMixer,
        events: Sender<PlayerEvent>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("progress".to_string())
            .spawn(move || run(mixer, events, cancel_rx, interval))?;
        Ok(Self { cancel_tx, handle })
    }

    /// Stop the worker and wait for it to exit.
    pub(crate) fn cancel(self) {
        let _ = self.cancel_tx.send(());
        if self.handle.join().is_err() {
            tracing::warn!("Progress worker panicked");
        }
    }
}

fn run(mixer: SharedMixer, events: Sender<PlayerEvent>, cancel: Receiver<()>, interval: Duration) {
    tracing::debug!("Progress reporting started");
    loop {
        match cancel.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        // Snapshot under the lock, emit outside it. A paused or missing
        // session produces no report for this tick.
        let progress = match mixer.lock().session() {
            Some(session) if session.is_playing() => Some(session.progress()),
            _ => None,
        };

        if let Some(progress) = progress {
            let event = PlayerEvent::PositionChanged {
                fraction: progress.fraction,
                elapsed: progress.elapsed,
                total: progress.total,
            };
            if events.try_send(event).is_err() {
                tracing::debug!("Position event dropped, subscriber not keeping up");
            }
        }
    }
    tracing::debug!("Progress reporting stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::decoder::{StreamFormat, StubSource};
    use crate::player::output::Mixer;
    use crate::player::session::Session;

    fn make_mixer_with_session(playing: bool) -> SharedMixer {
        let mixer = Mixer::shared();
        let session = Session::new(
            Box::new(StubSource::new(44_100, 1)),
            StreamFormat {
                sample_rate: 44_100,
                channels: 1,
            },
            1.0,
        );
        {
            let mut guard = mixer.lock();
            guard.install(session);
            guard
                .session_mut()
                .expect("session installed")
                .set_playing(playing);
        }
        mixer
    }

    #[test]
    fn test_reports_position_while_playing() {
        let mixer = make_mixer_with_session(true);
        let (tx, rx) = bounded(64);

        let task =
            ProgressTask::spawn(mixer, tx, Duration::from_millis(10)).expect("spawn progress");
        thread::sleep(Duration::from_millis(100));
        task.cancel();

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.len() >= 2, "expected reports, got {}", events.len());
        assert!(
            events
                .iter()
                .all(|e| matches!(e, PlayerEvent::PositionChanged { .. }))
        );
    }

    #[test]
    fn test_skips_reports_while_paused() {
        let mixer = make_mixer_with_session(false);
        let (tx, rx) = bounded(64);

        let task =
            ProgressTask::spawn(mixer, tx, Duration::from_millis(10)).expect("spawn progress");
        thread::sleep(Duration::from_millis(60));
        task.cancel();

        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn test_skips_reports_without_session() {
        let mixer = Mixer::shared();
        let (tx, rx) = bounded(64);

        let task =
            ProgressTask::spawn(mixer, tx, Duration::from_millis(10)).expect("spawn progress");
        thread::sleep(Duration::from_millis(60));
        task.cancel();

        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn test_cancel_stops_reports() {
        let mixer = make_mixer_with_session(true);
        let (tx, rx) = bounded(64);

        let task =
            ProgressTask::spawn(mixer, tx, Duration::from_millis(10)).expect("spawn progress");
        thread::sleep(Duration::from_millis(40));
        task.cancel();

        // Drain whatever was reported before the cancel, then confirm the
        // stream stays quiet.
        let _ = rx.try_iter().count();
        thread::sleep(Duration::from_millis(40));
        assert!(rx.try_iter().next().is_none());
    }
}
