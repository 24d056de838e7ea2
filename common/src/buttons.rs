//! Time-based polling debounce for the six front-panel buttons.
//!
//! Inputs are active-low: a pin reading `false` means the button pulls it to
//! ground. A button must be seen active on two polls spaced more than the
//! bounce window apart before it counts as pressed. After a press is
//! reported the window restarts at that poll, so a button that stays held
//! reports one further press per elapsed window.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Pump,
    Blower,
    Light,
    Mode,
    TempUp,
    TempDown,
}

impl Button {
    pub const ALL: [Button; 6] = [
        Button::Pump,
        Button::Blower,
        Button::Light,
        Button::Mode,
        Button::TempUp,
        Button::TempDown,
    ];

    fn index(self) -> usize {
        match self {
            Self::Pump => 0,
            Self::Blower => 1,
            Self::Light => 2,
            Self::Mode => 3,
            Self::TempUp => 4,
            Self::TempDown => 5,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pump" => Some(Self::Pump),
            "blower" | "jets" => Some(Self::Blower),
            "light" => Some(Self::Light),
            "mode" => Some(Self::Mode),
            "up" | "temp-up" => Some(Self::TempUp),
            "down" | "temp-down" => Some(Self::TempDown),
            _ => None,
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pump => "pump",
            Self::Blower => "blower",
            Self::Light => "light",
            Self::Mode => "mode",
            Self::TempUp => "temp-up",
            Self::TempDown => "temp-down",
        };
        f.write_str(name)
    }
}

/// One flag per button, used both for raw active levels and for presses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonSet([bool; 6]);

impl ButtonSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn only(button: Button) -> Self {
        let mut set = Self::default();
        set.insert(button);
        set
    }

    /// Converts electrical pin levels (in `Button::ALL` order) to active flags.
    pub fn from_pin_levels(levels: [bool; 6]) -> Self {
        Self(levels.map(|high| !high))
    }

    pub fn insert(&mut self, button: Button) {
        self.0[button.index()] = true;
    }

    pub fn contains(&self, button: Button) -> bool {
        self.0[button.index()]
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|flag| *flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = Button> + '_ {
        Button::ALL
            .into_iter()
            .filter(move |button| self.contains(*button))
    }
}

impl FromIterator<Button> for ButtonSet {
    fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
        let mut set = Self::default();
        for button in iter {
            set.insert(button);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    bounce_ms: u64,
    watching: bool,
    debounce_start_ms: u64,
}

impl Debouncer {
    pub fn new(bounce_ms: u64) -> Self {
        Self {
            bounce_ms,
            watching: false,
            debounce_start_ms: 0,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// Feed one poll of the input. Returns true on the poll that counts as a
    /// press.
    pub fn poll(&mut self, active: bool, now_ms: u64) -> bool {
        if !active {
            self.watching = false;
            return false;
        }

        if !self.watching {
            self.watching = true;
            self.debounce_start_ms = now_ms;
            return false;
        }

        if now_ms.saturating_sub(self.debounce_start_ms) > self.bounce_ms {
            self.debounce_start_ms = now_ms;
            return true;
        }

        false
    }
}

#[derive(Debug, Clone)]
pub struct ButtonPanel {
    debouncers: [Debouncer; 6],
}

impl ButtonPanel {
    pub fn new(bounce_ms: u64) -> Self {
        Self {
            debouncers: [Debouncer::new(bounce_ms); 6],
        }
    }

    /// Polls every button once. `active` holds the buttons currently pulled
    /// low.
    pub fn poll(&mut self, active: ButtonSet, now_ms: u64) -> ButtonSet {
        Button::ALL
            .into_iter()
            .filter(|button| self.debouncers[button.index()].poll(active.contains(*button), now_ms))
            .collect()
    }

    pub fn debouncer(&self, button: Button) -> &Debouncer {
        &self.debouncers[button.index()]
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn hold(debouncer: &mut Debouncer, from_ms: u64, to_ms: u64, step_ms: u64) -> Vec<u64> {
        let mut presses = Vec::new();
        let mut now = from_ms;
        while now <= to_ms {
            if debouncer.poll(true, now) {
                presses.push(now);
            }
            now += step_ms;
        }
        presses
    }

    #[test]
    fn chatter_shorter_than_window_is_ignored() {
        let mut debouncer = Debouncer::new(300);

        assert!(hold(&mut debouncer, 1_000, 1_300, 10).is_empty());
        assert!(!debouncer.poll(false, 1_310));
        assert!(!debouncer.is_watching());
        assert!(hold(&mut debouncer, 1_320, 1_400, 10).is_empty());
    }

    #[test]
    fn press_fires_once_window_is_exceeded() {
        let mut debouncer = Debouncer::new(300);

        assert_eq!(hold(&mut debouncer, 0, 400, 10), vec![310]);
    }

    #[test]
    fn held_button_repeats_once_per_window() {
        let mut debouncer = Debouncer::new(300);

        assert_eq!(hold(&mut debouncer, 0, 1_000, 10), vec![310, 620, 930]);
    }

    #[test]
    fn release_resets_the_watch() {
        let mut debouncer = Debouncer::new(300);

        assert_eq!(hold(&mut debouncer, 0, 350, 50), vec![350]);
        assert!(!debouncer.poll(false, 400));
        assert_eq!(hold(&mut debouncer, 450, 700, 50), Vec::<u64>::new());
        assert_eq!(hold(&mut debouncer, 750, 800, 50), vec![800]);
    }

    #[test]
    fn panel_tracks_buttons_independently() {
        let mut panel = ButtonPanel::new(100);
        let pump_and_light: ButtonSet = [Button::Pump, Button::Light].into_iter().collect();

        assert!(panel.poll(ButtonSet::only(Button::Pump), 0).is_empty());
        assert!(panel.poll(pump_and_light, 60).is_empty());
        let presses = panel.poll(pump_and_light, 120);

        assert_eq!(presses, ButtonSet::only(Button::Pump));
        assert!(panel.debouncer(Button::Light).is_watching());
        assert!(!panel.debouncer(Button::Mode).is_watching());

        let presses = panel.poll(ButtonSet::only(Button::Light), 180);
        assert_eq!(presses.iter().collect::<Vec<_>>(), vec![Button::Light]);
        assert!(!panel.debouncer(Button::Pump).is_watching());
    }

    #[test]
    fn pin_levels_are_active_low() {
        let set = ButtonSet::from_pin_levels([true, false, true, true, true, false]);

        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Button::Blower, Button::TempDown]
        );
    }

    #[test]
    fn parses_console_names() {
        assert_eq!(Button::parse(" Pump "), Some(Button::Pump));
        assert_eq!(Button::parse("up"), Some(Button::TempUp));
        assert_eq!(Button::parse("heater"), None);
    }
}
