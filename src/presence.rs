use rppal::gpio::InputPin;

/// A digital input wired to the SL030 tag detect (OUT) line
pub trait DetectPin {
    /// True while the line reads logic low
    fn is_low(&mut self) -> bool;
}

impl DetectPin for InputPin {
    fn is_low(&mut self) -> bool {
        InputPin::is_low(self)
    }
}

/// How the driver decides whether a tag is in range
pub enum PresenceStrategy {
    /// Read the active-low detect line
    Gpio(Box<dyn DetectPin>),
    /// Issue a select and check the status
    Polling,
}

impl PresenceStrategy {
    pub fn gpio(pin: impl DetectPin + 'static) -> PresenceStrategy {
        PresenceStrategy::Gpio(Box::new(pin))
    }
}

/// How a presence wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    Canceled,
}
