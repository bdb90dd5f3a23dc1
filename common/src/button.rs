/// Long-press detector for one polled push button.
///
/// Fed the raw pin level once per loop tick. A press that lasts at least the
/// threshold yields exactly one event, at the tick the threshold is crossed;
/// the button must be released before it can fire again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonState {
    active_low: bool,
    pressed_since_ms: Option<u64>,
    // Set after a fire until release so a continued hold does not restart
    // the press timer.
    latched: bool,
}

impl ButtonState {
    pub fn new(active_low: bool) -> Self {
        Self {
            active_low,
            pressed_since_ms: None,
            latched: false,
        }
    }

    pub fn pressed_since_ms(&self) -> Option<u64> {
        self.pressed_since_ms
    }

    /// Maps a raw pin level (`true` = high) to pressed/released.
    pub fn is_pressed_level(&self, level_high: bool) -> bool {
        if self.active_low {
            !level_high
        } else {
            level_high
        }
    }

    /// Advances the detector with a raw pin level.
    pub fn sample_level(&mut self, level_high: bool, now_ms: u64, long_press_ms: u64) -> bool {
        let pressed = self.is_pressed_level(level_high);
        self.update(pressed, now_ms, long_press_ms)
    }

    /// Advances the detector with an already-decoded pressed flag. Returns
    /// `true` when a long-press completes on this tick.
    pub fn update(&mut self, pressed: bool, now_ms: u64, long_press_ms: u64) -> bool {
        if !pressed {
            self.pressed_since_ms = None;
            self.latched = false;
            return false;
        }

        if self.latched {
            return false;
        }

        let started = *self.pressed_since_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(started) >= long_press_ms {
            self.pressed_since_ms = None;
            self.latched = true;
            return true;
        }

        false
    }
}
