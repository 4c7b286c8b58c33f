//! Hotkey decoder — raw key DOWN/UP events → semantic [`Command`]s.
//!
//! A synchronous reducer over (modifier state, digit buffer). Every
//! input, however malformed, resolves to a state transition; the decoder
//! never errors and never blocks.
//!
//! Per DOWN event, first match wins:
//!
//! 1. modifier key → set its flag
//! 2. hotkey table match under the exact held modifiers → emit, clear digits
//! 3. Ctrl (without Alt) + keypad digit → digit sequence
//! 4. anything else → no-op
//!
//! Two digits within [`DIGIT_IDLE_THRESHOLD`] of each other emit
//! `SetTemperature(10 * d1 + d2)` on the second DOWN. Releasing the last
//! held Ctrl key abandons a pending digit.

use std::fmt;
use std::time::{Duration, Instant};

use crate::command::Command;

use super::keybinding::{HotkeyTable, Modifier, Modifiers, keypad_digit, modifier_for_key};

/// Maximum gap between the two digits of a temperature sequence.
pub const DIGIT_IDLE_THRESHOLD: Duration = Duration::from_millis(1000);

/// Silence after which held-modifier state is assumed lost (missed UP).
pub const STALE_STATE_AFTER: Duration = Duration::from_secs(60);

/// Press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Down => "down",
            Self::Up => "up",
        })
    }
}

/// A raw event from the input source, keyed by reported keysym name.
///
/// `captured_at` is when the source read the event. Events can sit in
/// the channel for a while before they are decoded, so the timing gates
/// use the capture time when present and the decoder's clock otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub key: String,
    pub action: KeyAction,
    pub captured_at: Option<Instant>,
}

impl RawKeyEvent {
    pub fn down(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            action: KeyAction::Down,
            captured_at: None,
        }
    }

    pub fn up(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            action: KeyAction::Up,
            captured_at: None,
        }
    }

    pub fn captured_at(mut self, at: Instant) -> Self {
        self.captured_at = Some(at);
        self
    }
}

/// Monotonic time source for the idle threshold.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Up to two pending digits plus the time of the last accepted one.
#[derive(Debug, Default)]
struct DigitBuffer {
    digits: Vec<u8>,
    last_digit_at: Option<Instant>,
}

impl DigitBuffer {
    fn clear(&mut self) {
        self.digits.clear();
        self.last_digit_at = None;
    }

    /// Accept a digit; returns the combined value once two are held.
    fn push(&mut self, digit: u8, now: Instant) -> Option<u8> {
        if let Some(last) = self.last_digit_at
            && now.saturating_duration_since(last) > DIGIT_IDLE_THRESHOLD
        {
            tracing::debug!(stale = ?self.digits, "discarding stale digit sequence");
            self.clear();
        }

        self.digits.push(digit);
        self.last_digit_at = Some(now);

        if self.digits.len() < 2 {
            return None;
        }
        let value = self.digits[0] * 10 + self.digits[1];
        self.clear();
        Some(value)
    }
}

/// Hotkey decoder state machine.
pub struct Decoder<C: Clock = SystemClock> {
    table: HotkeyTable,
    clock: C,
    /// Held physical keys per modifier, one bit per key.
    ctrl_keys: u8,
    alt_keys: u8,
    digits: DigitBuffer,
    last_event_at: Option<Instant>,
}

impl Decoder<SystemClock> {
    pub fn new(table: HotkeyTable) -> Self {
        Self::with_clock(table, SystemClock)
    }
}

impl<C: Clock> Decoder<C> {
    pub fn with_clock(table: HotkeyTable, clock: C) -> Self {
        Self {
            table,
            clock,
            ctrl_keys: 0,
            alt_keys: 0,
            digits: DigitBuffer::default(),
            last_event_at: None,
        }
    }

    /// Feed one raw event; returns the command it completes, if any.
    pub fn handle(&mut self, event: &RawKeyEvent) -> Option<Command> {
        let now = event.captured_at.unwrap_or_else(|| self.clock.now());

        if let Some(last) = self.last_event_at
            && now.saturating_duration_since(last) > STALE_STATE_AFTER
            && (self.modifiers() != Modifiers::default() || !self.digits.digits.is_empty())
        {
            tracing::debug!(modifiers = ?self.modifiers(), "input idle, resetting decoder state");
            self.reset();
        }
        self.last_event_at = Some(now);

        match event.action {
            KeyAction::Down => self.key_down(&event.key, now),
            KeyAction::Up => {
                self.key_up(&event.key);
                None
            }
        }
    }

    /// Forget held modifiers and pending digits.
    pub fn reset(&mut self) {
        self.ctrl_keys = 0;
        self.alt_keys = 0;
        self.digits.clear();
    }

    pub fn modifiers(&self) -> Modifiers {
        Modifiers {
            ctrl: self.ctrl_keys != 0,
            alt: self.alt_keys != 0,
        }
    }

    pub fn pending_digits(&self) -> &[u8] {
        &self.digits.digits
    }

    fn key_down(&mut self, key: &str, now: Instant) -> Option<Command> {
        if let Some(held) = modifier_for_key(key) {
            match held.modifier {
                Modifier::Ctrl => self.ctrl_keys |= held.bit,
                Modifier::Alt => self.alt_keys |= held.bit,
            }
            return None;
        }

        let modifiers = self.modifiers();
        if let Some(command) = self.table.lookup(modifiers, key) {
            self.digits.clear();
            return Some(command);
        }

        if modifiers == Modifiers::CTRL
            && let Some(digit) = keypad_digit(key)
        {
            return self.digits.push(digit, now).map(Command::SetTemperature);
        }

        None
    }

    fn key_up(&mut self, key: &str) {
        let Some(held) = modifier_for_key(key) else {
            return;
        };
        match held.modifier {
            Modifier::Ctrl => {
                self.ctrl_keys &= !held.bit;
                if self.ctrl_keys == 0 {
                    self.digits.clear();
                }
            }
            Modifier::Alt => self.alt_keys &= !held.bit,
        }
    }
}
