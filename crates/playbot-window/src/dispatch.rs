//! Asynchronous key delivery. Presses are queued on a bounded channel and
//! delivered by a worker task that owns the window backend; refocusing an
//! unfocused window waits for a settle delay before the key goes out. The
//! frame loop never blocks on delivery, so a key requested on frame N may
//! land after frame N+1 has been processed.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{GameWindow, InputError, InputSink, Key, RunState};

/// Delay between refocusing the target window and delivering the key, so
/// the window manager has settled.
pub const FOCUS_SETTLE: Duration = Duration::from_millis(250);

/// Default press queue depth. A full queue drops the press with an error
/// rather than stalling the frame loop.
pub const DEFAULT_QUEUE: usize = 8;

enum Request {
    Press {
        key: Key,
        done: oneshot::Sender<Result<(), InputError>>,
    },
    Pause,
    Resume,
}

/// Receipt for one dispatched press. Await it to learn the delivery
/// outcome, or drop it for fire-and-forget.
pub struct PressHandle {
    rx: oneshot::Receiver<Result<(), InputError>>,
}

impl PressHandle {
    pub async fn delivered(self) -> Result<(), InputError> {
        self.rx.await.map_err(|_| InputError::DispatcherGone)?
    }
}

/// Owns the queue side of key delivery. Cloneable; all clones feed the same
/// worker.
#[derive(Clone)]
pub struct KeyDispatcher {
    tx: mpsc::Sender<Request>,
}

impl KeyDispatcher {
    /// Spawn the delivery worker on the current tokio runtime.
    pub fn spawn<W: GameWindow + 'static>(window: W) -> Self {
        Self::with_capacity(window, DEFAULT_QUEUE)
    }

    pub fn with_capacity<W: GameWindow + 'static>(mut window: W, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(capacity);
        tokio::spawn(async move {
            let mut state = RunState::Playing;
            while let Some(request) = rx.recv().await {
                match request {
                    Request::Press { key, done } => {
                        let result = deliver(&mut window, key).await;
                        if let Err(ref e) = result {
                            warn!("key {key} not delivered: {e}");
                        }
                        let _ = done.send(result);
                    }
                    Request::Pause => {
                        if state == RunState::Paused {
                            debug!("already paused, ignoring pause request");
                        } else {
                            match window.pause_process() {
                                Ok(()) => {
                                    info!("game paused");
                                    state = RunState::Paused;
                                }
                                Err(e) => warn!("pause failed: {e}"),
                            }
                        }
                    }
                    Request::Resume => {
                        if state == RunState::Playing {
                            debug!("not paused, ignoring resume request");
                        } else {
                            match window.resume_process() {
                                Ok(()) => {
                                    info!("game resumed");
                                    state = RunState::Playing;
                                }
                                Err(e) => warn!("resume failed: {e}"),
                            }
                        }
                    }
                }
            }
            debug!("key dispatcher worker stopped");
        });
        Self { tx }
    }

    /// Queue a press and get a handle to its outcome. Fails immediately
    /// when the queue is full.
    pub fn dispatch(&self, key: Key) -> Result<PressHandle, InputError> {
        let (done, rx) = oneshot::channel();
        self.send(Request::Press { key, done })?;
        Ok(PressHandle { rx })
    }

    fn send(&self, request: Request) -> Result<(), InputError> {
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => InputError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => InputError::DispatcherGone,
        })
    }
}

impl InputSink for KeyDispatcher {
    fn press(&self, key: Key) -> Result<(), InputError> {
        self.dispatch(key).map(drop)
    }

    fn pause(&self) -> Result<(), InputError> {
        self.send(Request::Pause)
    }

    fn resume(&self) -> Result<(), InputError> {
        self.send(Request::Resume)
    }
}

async fn deliver<W: GameWindow>(window: &mut W, key: Key) -> Result<(), InputError> {
    if !window.is_focused()? {
        debug!("refocusing target window before {key}");
        window.focus()?;
        tokio::time::sleep(FOCUS_SETTLE).await;
    }
    window.press_now(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeWindow {
        focused: bool,
        presses: Arc<Mutex<Vec<Key>>>,
        pauses: Arc<Mutex<u32>>,
        resumes: Arc<Mutex<u32>>,
    }

    impl GameWindow for FakeWindow {
        fn is_focused(&self) -> Result<bool, InputError> {
            Ok(self.focused)
        }

        fn focus(&mut self) -> Result<(), InputError> {
            self.focused = true;
            Ok(())
        }

        fn press_now(&mut self, key: Key) -> Result<(), InputError> {
            self.presses.lock().unwrap().push(key);
            Ok(())
        }

        fn pause_process(&mut self) -> Result<(), InputError> {
            *self.pauses.lock().unwrap() += 1;
            Ok(())
        }

        fn resume_process(&mut self) -> Result<(), InputError> {
            *self.resumes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn focused_press_is_delivered() {
        let window = FakeWindow {
            focused: true,
            ..FakeWindow::default()
        };
        let presses = window.presses.clone();
        let dispatcher = KeyDispatcher::spawn(window);
        dispatcher
            .dispatch(Key::Confirm)
            .unwrap()
            .delivered()
            .await
            .unwrap();
        assert_eq!(*presses.lock().unwrap(), vec![Key::Confirm]);
    }

    #[tokio::test]
    async fn unfocused_press_refocuses_then_delivers() {
        let window = FakeWindow::default();
        let presses = window.presses.clone();
        let started = std::time::Instant::now();
        let dispatcher = KeyDispatcher::spawn(window);
        let handle = dispatcher.dispatch(Key::Left).unwrap();
        handle.delivered().await.unwrap();
        assert!(started.elapsed() >= FOCUS_SETTLE);
        assert_eq!(*presses.lock().unwrap(), vec![Key::Left]);
    }

    #[tokio::test]
    async fn full_queue_reports_overflow() {
        let window = FakeWindow {
            focused: true,
            ..FakeWindow::default()
        };
        let dispatcher = KeyDispatcher::with_capacity(window, 2);
        // The worker has had no chance to run yet, so the third press must
        // bounce off the bounded queue.
        dispatcher.press(Key::Up).unwrap();
        dispatcher.press(Key::Up).unwrap();
        assert!(matches!(
            dispatcher.press(Key::Up),
            Err(InputError::QueueFull)
        ));
    }

    #[tokio::test]
    async fn pause_and_resume_are_idempotent() {
        let window = FakeWindow {
            focused: true,
            ..FakeWindow::default()
        };
        let pauses = window.pauses.clone();
        let resumes = window.resumes.clone();
        let dispatcher = KeyDispatcher::spawn(window);

        dispatcher.pause().unwrap();
        dispatcher.pause().unwrap();
        dispatcher.resume().unwrap();
        dispatcher.resume().unwrap();

        // Drain the queue by waiting on a final press.
        dispatcher
            .dispatch(Key::Confirm)
            .unwrap()
            .delivered()
            .await
            .unwrap();

        assert_eq!(*pauses.lock().unwrap(), 1);
        assert_eq!(*resumes.lock().unwrap(), 1);
    }
}
