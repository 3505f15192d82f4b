use embedded_hal::digital::v2::InputPin;

/// Consecutive disagreeing samples needed before a level change is accepted.
pub const DEBOUNCE_SAMPLES: u8 = 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ButtonEvent {
    Pressed,
    Released,
}

/// Active-low push button sampled from a periodic task.
pub struct Button<P> {
    pin: P,
    pressed: bool,
    counter: u8,
}

impl<P: InputPin> Button<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            pressed: false,
            counter: 0,
        }
    }

    /// Take one sample. Reports an edge once the new level has held for
    /// [`DEBOUNCE_SAMPLES`] polls; a read error counts as "no change".
    pub fn poll(&mut self) -> Option<ButtonEvent> {
        let raw = self.pin.is_low().unwrap_or(self.pressed);

        if raw == self.pressed {
            self.counter = 0;
            return None;
        }

        self.counter = self.counter.saturating_add(1);
        if self.counter < DEBOUNCE_SAMPLES {
            return None;
        }

        self.pressed = raw;
        self.counter = 0;
        Some(if raw {
            ButtonEvent::Pressed
        } else {
            ButtonEvent::Released
        })
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn release(self) -> P {
        self.pin
    }
}
