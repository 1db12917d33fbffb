//! Controller control loop and wiring.
//!
//! [`Controller`] assembles the controller side: it starts the indicator
//! worker and hands out the dispatcher and connection watcher that the link
//! context drives. [`ControlLoop`] is the discrete-time loop sampling the
//! physical trigger and driving the status light, one [`ControlLoop::step`]
//! per quantum.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::dispatch::Dispatcher;
use crate::led::{IndicatorBank, IndicatorDriver, IndicatorPipeline};
use crate::link::{ConnectionWatcher, LinkSnapshot};
use crate::protocol::CMD_MUTE_REQUEST;
use crate::transport::{FrameSink, send_logged};

/// Control loop period.
pub const CONTROL_QUANTUM: Duration = Duration::from_millis(100);

/// Physical mute button. Level-triggered: `true` while held.
pub trait TriggerInput {
    fn poll(&mut self) -> bool;
}

/// Single status LED next to the ring.
pub trait StatusLight {
    fn set(&mut self, on: bool);
}

/// What one control step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Idle,
    /// Trigger held while linked; a mute request was written.
    RequestSent,
    /// Trigger held while not linked; nothing was written.
    PressedOffline,
}

pub struct ControlLoop<T, L, S> {
    trigger: T,
    light: L,
    sink: S,
    link: LinkSnapshot,
    blinking: bool,
}

impl<T: TriggerInput, L: StatusLight, S: FrameSink> ControlLoop<T, L, S> {
    pub fn new(trigger: T, light: L, sink: S, link: LinkSnapshot) -> Self {
        ControlLoop {
            trigger,
            light,
            sink,
            link,
            blinking: true,
        }
    }

    /// One quantum: toggle blink phase, sample trigger, update status light.
    ///
    /// The status light stays on while linked and blinks otherwise.
    pub fn step(&mut self) -> StepOutcome {
        self.blinking = !self.blinking;
        let connected = self.link.is_connected();

        let outcome = if self.trigger.poll() {
            if connected {
                log::info!("[trigger] mute pressed while connected");
                send_logged(&self.sink, CMD_MUTE_REQUEST);
                StepOutcome::RequestSent
            } else {
                log::info!("[trigger] mute pressed, but not connected");
                StepOutcome::PressedOffline
            }
        } else {
            StepOutcome::Idle
        };

        self.light.set(connected || self.blinking);
        outcome
    }

    /// Step every `quantum` until `running` clears.
    pub fn run(&mut self, running: &AtomicBool, quantum: Duration) {
        while running.load(Ordering::SeqCst) {
            self.step();
            std::thread::sleep(quantum);
        }
    }
}

/// Controller-side assembly: indicator worker plus link-context handles.
pub struct Controller {
    pipeline: IndicatorPipeline,
    dispatcher: Dispatcher,
    watcher: ConnectionWatcher,
}

impl Controller {
    pub fn start(driver: impl IndicatorDriver + 'static) -> std::io::Result<Self> {
        let pipeline = IndicatorPipeline::spawn(driver)?;
        let dispatcher = Dispatcher::new(pipeline.queue());
        let watcher = ConnectionWatcher::new(pipeline.queue());
        Ok(Controller {
            pipeline,
            dispatcher,
            watcher,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn watcher_mut(&mut self) -> &mut ConnectionWatcher {
        &mut self.watcher
    }

    pub fn link(&self) -> LinkSnapshot {
        self.watcher.snapshot()
    }

    /// Stop accepting input and wait for the worker to apply what is queued.
    pub fn shutdown(self) -> Option<IndicatorBank> {
        let Controller {
            pipeline,
            dispatcher,
            watcher,
        } = self;
        drop(dispatcher);
        drop(watcher);
        pipeline.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::Color;
    use crate::led::mock::RecordingDriver;
    use crate::protocol::encode;
    use crate::transport::mock::RecordingSink;
    use std::collections::VecDeque;

    struct ScriptedTrigger(VecDeque<bool>);

    impl TriggerInput for ScriptedTrigger {
        fn poll(&mut self) -> bool {
            self.0.pop_front().unwrap_or(false)
        }
    }

    #[derive(Default)]
    struct LightLog(Vec<bool>);

    impl StatusLight for &mut LightLog {
        fn set(&mut self, on: bool) {
            self.0.push(on);
        }
    }

    fn trigger(levels: &[bool]) -> ScriptedTrigger {
        ScriptedTrigger(levels.iter().copied().collect())
    }

    #[test]
    fn press_while_connected_sends_request() {
        let driver = RecordingDriver::new();
        let mut ctl = Controller::start(driver).unwrap();
        ctl.watcher_mut().link_up();
        let sink = RecordingSink::new();
        let mut lights = LightLog::default();
        let mut lp = ControlLoop::new(trigger(&[true]), &mut lights, &sink, ctl.link());

        assert_eq!(lp.step(), StepOutcome::RequestSent);
        assert_eq!(sink.frames(), vec![CMD_MUTE_REQUEST]);
        drop(lp);
        ctl.shutdown();
    }

    #[test]
    fn press_while_offline_sends_nothing() {
        let sink = RecordingSink::new();
        let mut lights = LightLog::default();
        let mut lp = ControlLoop::new(
            trigger(&[true, true]),
            &mut lights,
            &sink,
            LinkSnapshot::default(),
        );
        assert_eq!(lp.step(), StepOutcome::PressedOffline);
        assert_eq!(lp.step(), StepOutcome::PressedOffline);
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn held_trigger_requests_every_step() {
        let driver = RecordingDriver::new();
        let mut ctl = Controller::start(driver).unwrap();
        ctl.watcher_mut().link_up();
        let sink = RecordingSink::new();
        let mut lights = LightLog::default();
        let mut lp = ControlLoop::new(
            trigger(&[true, true, false, true]),
            &mut lights,
            &sink,
            ctl.link(),
        );
        let outcomes: Vec<StepOutcome> = (0..4).map(|_| lp.step()).collect();
        assert_eq!(
            outcomes,
            vec![
                StepOutcome::RequestSent,
                StepOutcome::RequestSent,
                StepOutcome::Idle,
                StepOutcome::RequestSent
            ]
        );
        assert_eq!(sink.frames().len(), 3);
    }

    #[test]
    fn status_light_blinks_offline_and_holds_when_linked() {
        let driver = RecordingDriver::new();
        let mut ctl = Controller::start(driver).unwrap();
        let sink = RecordingSink::new();
        let mut lights = LightLog::default();
        {
            let mut lp = ControlLoop::new(trigger(&[]), &mut lights, &sink, ctl.link());
            for _ in 0..4 {
                lp.step();
            }
            ctl.watcher_mut().link_up();
            for _ in 0..3 {
                lp.step();
            }
        }
        assert_eq!(lights.0, vec![false, true, false, true, true, true, true]);
        ctl.shutdown();
    }

    #[test]
    fn controller_routes_frames_and_disconnects_to_ring() {
        let driver = RecordingDriver::new();
        let mut ctl = Controller::start(driver.clone()).unwrap();
        ctl.watcher_mut().link_up();
        ctl.dispatcher().handle_write(0, &encode(0xFE, 0x02)).unwrap();
        let _ = ctl.dispatcher().handle_write(0, &[0x00, 0xBD, 0x03]);
        ctl.watcher_mut().link_down();
        ctl.watcher_mut().link_down();
        let bank = ctl.shutdown().unwrap();

        let firsts: Vec<Color> = driver.writes().iter().map(|w| w[0]).collect();
        assert_eq!(firsts, vec![Color::GREEN, Color::BLACK]);
        assert_eq!(bank.cells()[9], Color::BLACK);
    }

    #[test]
    fn run_exits_when_flag_clear() {
        let sink = RecordingSink::new();
        let mut lights = LightLog::default();
        let mut lp = ControlLoop::new(trigger(&[]), &mut lights, &sink, LinkSnapshot::default());
        let running = AtomicBool::new(false);
        lp.run(&running, Duration::from_millis(1));
        drop(lp);
        assert!(lights.0.is_empty());
    }
}
