use crate::{
    button::ButtonState,
    clock::WallClock,
    command::LockCommand,
    config::{OpenerConfig, TimingConfig},
    cooldown::CooldownTimer,
    dispatch::{CommandTransport, DispatchError, Dispatcher, LinkStatus, TransportResponse},
    display::{format_time_line, LockDisplayState, RedrawThrottle, StatusFrame},
};

/// Result of the one dispatch a tick may perform.
#[derive(Debug)]
pub struct TickOutcome {
    pub command: LockCommand,
    pub result: Result<TransportResponse, DispatchError>,
}

/// Platform handles a dispatch goes through.
pub struct Uplink<'a, T, L: ?Sized, C: ?Sized> {
    pub dispatcher: &'a mut Dispatcher<T>,
    pub link: &'a L,
    pub clock: &'a C,
}

/// Loop context: button debounce, the shared cooldown gate and what the
/// status screen shows. Owned and mutated only by the main loop.
#[derive(Debug, Clone)]
pub struct OpenerEngine {
    timing: TimingConfig,
    utc_offset_hours: i32,
    timezone_label: String,
    unlock_button: ButtonState,
    lock_button: ButtonState,
    cooldown: CooldownTimer,
    display: LockDisplayState,
    redraw: RedrawThrottle,
}

impl OpenerEngine {
    pub fn new(config: &OpenerConfig) -> Self {
        Self {
            timing: config.timing.clone(),
            utc_offset_hours: config.display.utc_offset_hours,
            timezone_label: config.display.timezone_label.clone(),
            unlock_button: ButtonState::new(config.buttons.active_low),
            lock_button: ButtonState::new(config.buttons.active_low),
            cooldown: CooldownTimer::new(config.timing.cooldown_ms),
            display: LockDisplayState::locked(),
            redraw: RedrawThrottle::new(config.timing.display_refresh_ms),
        }
    }

    pub fn display_state(&self) -> &LockDisplayState {
        &self.display
    }

    pub fn cooldown(&self) -> &CooldownTimer {
        &self.cooldown
    }

    pub fn unlock_button(&self) -> &ButtonState {
        &self.unlock_button
    }

    pub fn lock_button(&self) -> &ButtonState {
        &self.lock_button
    }

    pub fn force_redraw(&mut self) {
        self.redraw.force();
    }

    /// Advances both buttons and returns the command to send this tick, if
    /// any. The unlock button is evaluated first; a completed press that
    /// finds the cooldown closed is dropped.
    pub fn poll_buttons(
        &mut self,
        unlock_pressed: bool,
        lock_pressed: bool,
        now_ms: u64,
    ) -> Option<LockCommand> {
        let long_press_ms = self.timing.long_press_ms;
        let unlock_fired = self
            .unlock_button
            .update(unlock_pressed, now_ms, long_press_ms);
        let lock_fired = self.lock_button.update(lock_pressed, now_ms, long_press_ms);

        let mut command = None;
        for (fired, candidate) in [
            (unlock_fired, LockCommand::Unlock),
            (lock_fired, LockCommand::Lock),
        ] {
            if fired && self.cooldown.try_acquire(now_ms) {
                command = Some(candidate);
            }
        }
        command
    }

    /// Applies a dispatch result to the display state and forces a redraw.
    /// `now_ms` is the time the dispatch returned.
    pub fn record_dispatch(
        &mut self,
        command: LockCommand,
        result: &Result<TransportResponse, DispatchError>,
        now_ms: u64,
    ) {
        match result {
            Ok(_) => match command {
                LockCommand::Unlock => self.display.set_unlocked(),
                LockCommand::Lock => self.display.set_locked(),
            },
            Err(err) if err.is_connectivity() => {}
            Err(_) => {
                self.display
                    .show_error(now_ms, self.timing.error_overlay_ms);
                if let Some(until) = self.display.error_until_ms {
                    self.redraw.schedule(until);
                }
            }
        }
        self.redraw.force();
    }

    /// One loop iteration: debounce, at most one blocking dispatch, state
    /// update. `monotonic_ms` is read again after the dispatch returns.
    pub fn tick<T, L, C, M>(
        &mut self,
        unlock_pressed: bool,
        lock_pressed: bool,
        now_ms: u64,
        uplink: Uplink<'_, T, L, C>,
        monotonic_ms: M,
    ) -> Option<TickOutcome>
    where
        T: CommandTransport,
        L: LinkStatus + ?Sized,
        C: WallClock + ?Sized,
        M: FnOnce() -> u64,
    {
        let command = self.poll_buttons(unlock_pressed, lock_pressed, now_ms)?;
        let result = uplink
            .dispatcher
            .dispatch(command, uplink.link, uplink.clock);
        let finished_ms = monotonic_ms().max(now_ms);
        self.record_dispatch(command, &result, finished_ms);
        Some(TickOutcome { command, result })
    }

    /// Builds the next frame if a redraw is due. The battery is only read
    /// when a frame is produced.
    pub fn frame_if_due<B>(
        &mut self,
        now_ms: u64,
        epoch_secs: i64,
        battery_volts: B,
    ) -> Option<StatusFrame>
    where
        B: FnOnce() -> Option<f32>,
    {
        if !self.redraw.take(now_ms) {
            return None;
        }

        let time_text = format_time_line(&self.timezone_label, epoch_secs, self.utc_offset_hours);
        Some(StatusFrame::build(
            &self.display,
            battery_volts(),
            time_text,
            now_ms,
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        clock::TIME_SYNC_SENTINEL_EPOCH,
        dispatch::tests::{test_api, FakeTransport, FixedClock, FixedLink},
        display::{StatusColor, LABEL_LOCKED, LABEL_UNLOCKED},
    };

    const EPOCH: i64 = 1_700_000_000;

    struct Harness {
        engine: OpenerEngine,
        dispatcher: Dispatcher<FakeTransport>,
        clock: FixedClock,
        link: FixedLink,
    }

    impl Harness {
        fn new(transport: FakeTransport) -> Self {
            let mut engine = OpenerEngine::new(&OpenerConfig::default());
            // startup frame
            engine.force_redraw();
            let _ = engine.frame_if_due(0, EPOCH, || Some(4.0));
            Self {
                engine,
                dispatcher: Dispatcher::new(test_api(), transport),
                clock: FixedClock::synced(),
                link: FixedLink(true),
            }
        }

        /// Holds one button from `start_ms` for `duration_ms`, ticking every
        /// 10 ms, then releases it.
        fn hold(&mut self, unlock: bool, start_ms: u64, duration_ms: u64) -> Vec<TickOutcome> {
            let mut outcomes = Vec::new();
            let mut now = start_ms;
            while now <= start_ms + duration_ms {
                let finished = now;
                if let Some(outcome) = self.engine.tick(
                    unlock,
                    !unlock,
                    now,
                    Uplink {
                        dispatcher: &mut self.dispatcher,
                        link: &self.link,
                        clock: &self.clock,
                    },
                    || finished,
                ) {
                    outcomes.push(outcome);
                }
                now += 10;
            }
            let _ = self.engine.poll_buttons(false, false, now);
            outcomes
        }

        fn calls(&self) -> usize {
            self.dispatcher.transport().calls.len()
        }
    }

    #[test]
    fn short_press_sends_nothing() {
        let mut harness = Harness::new(FakeTransport::replying(200));

        let outcomes = harness.hold(true, 1_000, 1_900);

        assert!(outcomes.is_empty());
        assert_eq!(harness.calls(), 0);
    }

    #[test]
    fn long_press_unlocks_on_success() {
        let mut harness = Harness::new(FakeTransport::replying(200));

        let outcomes = harness.hold(true, 1_000, 2_100);

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].command, LockCommand::Unlock);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(harness.calls(), 1);

        let state = harness.engine.display_state();
        assert_eq!(state.label, LABEL_UNLOCKED);
        assert_eq!(state.color, StatusColor::Red);

        let frame = harness
            .engine
            .frame_if_due(3_110, EPOCH, || Some(4.0))
            .expect("forced redraw after dispatch");
        assert_eq!(frame.label, LABEL_UNLOCKED);
        assert!(!frame.error_overlay);
    }

    #[test]
    fn rejected_command_shows_overlay_and_keeps_label() {
        let mut harness = Harness::new(FakeTransport::replying(403));

        let outcomes = harness.hold(true, 1_000, 2_100);

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].result,
            Err(DispatchError::Rejected { status: 403, .. })
        ));
        assert_eq!(harness.engine.cooldown().last_action_ms(), Some(3_000));

        let state = harness.engine.display_state().clone();
        assert_eq!(state.label, LABEL_LOCKED);
        assert_eq!(state.color, StatusColor::Green);
        assert_eq!(state.error_until_ms, Some(6_000));

        let frame = harness.engine.frame_if_due(3_110, EPOCH, || None).unwrap();
        assert!(frame.error_overlay);
        assert!(harness.engine.frame_if_due(5_999, EPOCH, || None).is_none());

        let cleared = harness
            .engine
            .frame_if_due(6_000, EPOCH, || None)
            .expect("redraw when overlay expires");
        assert!(!cleared.error_overlay);
    }

    #[test]
    fn press_within_cooldown_is_dropped() {
        let mut harness = Harness::new(FakeTransport::replying(200));
        assert_eq!(harness.hold(true, 1_000, 2_100).len(), 1);

        // lock button completes at 6_000, within 5 s of the 3_000 action
        let outcomes = harness.hold(false, 4_000, 2_100);

        assert!(outcomes.is_empty());
        assert_eq!(harness.calls(), 1);
        assert_eq!(harness.engine.display_state().label, LABEL_UNLOCKED);
        assert_eq!(harness.engine.cooldown().last_action_ms(), Some(3_000));
    }

    #[test]
    fn press_after_cooldown_is_sent() {
        let mut harness = Harness::new(FakeTransport::replying(200));
        assert_eq!(harness.hold(true, 1_000, 2_100).len(), 1);

        let outcomes = harness.hold(false, 6_500, 2_100);

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].command, LockCommand::Lock);
        assert_eq!(harness.engine.display_state().label, LABEL_LOCKED);
    }

    #[test]
    fn failed_attempt_still_starts_cooldown() {
        let mut harness = Harness::new(FakeTransport::failing("connection refused"));
        assert_eq!(harness.hold(true, 1_000, 2_100).len(), 1);

        let outcomes = harness.hold(true, 4_000, 2_100);

        assert!(outcomes.is_empty());
        assert_eq!(harness.calls(), 1);
    }

    #[test]
    fn simultaneous_completion_favors_unlock() {
        let mut engine = OpenerEngine::new(&OpenerConfig::default());
        assert_eq!(engine.poll_buttons(true, true, 0), None);

        assert_eq!(
            engine.poll_buttons(true, true, 2_000),
            Some(LockCommand::Unlock)
        );
        // lock's completion was consumed, not queued
        assert_eq!(engine.poll_buttons(true, true, 7_500), None);
        assert_eq!(engine.lock_button().pressed_since_ms(), None);
    }

    #[test]
    fn holding_through_cooldown_does_not_auto_fire() {
        let mut engine = OpenerEngine::new(&OpenerConfig::default());
        assert_eq!(engine.poll_buttons(true, false, 0), None);
        assert_eq!(
            engine.poll_buttons(true, false, 2_000),
            Some(LockCommand::Unlock)
        );

        assert_eq!(engine.poll_buttons(false, true, 3_000), None);
        assert_eq!(engine.poll_buttons(false, true, 5_000), None);
        for now in (5_010..12_000).step_by(10) {
            assert_eq!(engine.poll_buttons(false, true, now), None);
        }
    }

    #[test]
    fn unsynced_clock_skips_network_and_overlay() {
        let mut harness = Harness::new(FakeTransport::replying(200));
        harness.clock = FixedClock::unsynced();

        let outcomes = harness.hold(true, 1_000, 2_100);

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].result,
            Err(DispatchError::ClockNotSynced { .. })
        ));
        assert_eq!(harness.calls(), 0);
        assert_eq!(harness.engine.display_state().error_until_ms, None);
        assert_eq!(harness.engine.display_state().label, LABEL_LOCKED);
    }

    #[test]
    fn clock_exactly_at_sync_cutoff_sends_command() {
        let mut harness = Harness::new(FakeTransport::replying(200));
        harness.clock = FixedClock(Utc.timestamp_opt(TIME_SYNC_SENTINEL_EPOCH, 0).unwrap());

        let outcomes = harness.hold(true, 1_000, 2_100);

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(harness.calls(), 1);
        assert_eq!(harness.engine.display_state().label, LABEL_UNLOCKED);
    }

    #[test]
    fn passive_redraw_follows_refresh_interval() {
        let mut harness = Harness::new(FakeTransport::replying(200));

        assert!(harness.engine.frame_if_due(30_000, EPOCH, || None).is_none());
        let frame = harness.engine.frame_if_due(60_000, EPOCH, || Some(3.95)).unwrap();

        assert_eq!(frame.time_text, "JST 07:13");
        assert_eq!(frame.battery_text, "Battery: 3.95v");
    }
}
