//! Sanitized input intents.
//!
//! A client's [`RawIntent`] is checked field by field. Anything out of shape
//! falls back to that field's neutral value, so the simulation only ever
//! sees well-formed intents.

use std::f32::consts::TAU;
use std::fmt;

use browsercraft_protocol::{Lenient, RawIntent};

/// Largest orientation magnitude (radians) accepted before normalizing.
/// Bigger values are finite but carry no usable precision as an angle.
pub const MAX_ORIENTATION: f64 = 1.0e6;

/// Held movement keys, as a bitmask.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyState(u8);

impl KeyState {
    pub const UP: Self = Self(1 << 0);
    pub const DOWN: Self = Self(1 << 1);
    pub const LEFT: Self = Self(1 << 2);
    pub const RIGHT: Self = Self(1 << 3);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Maps a wire key name to a key. Case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "up" => Some(Self::UP),
            "down" => Some(Self::DOWN),
            "left" => Some(Self::LEFT),
            "right" => Some(Self::RIGHT),
            _ => None,
        }
    }

    /// Movement direction on each axis, in screen coordinates (`up` is -y).
    /// Opposite keys held together cancel out.
    pub fn axis(self) -> (i8, i8) {
        let dx = self.contains(Self::RIGHT) as i8 - self.contains(Self::LEFT) as i8;
        let dy = self.contains(Self::DOWN) as i8 - self.contains(Self::UP) as i8;
        (dx, dy)
    }
}

impl std::ops::BitOr for KeyState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::UP, "up"),
            (Self::DOWN, "down"),
            (Self::LEFT, "left"),
            (Self::RIGHT, "right"),
        ];
        f.debug_set()
            .entries(names.iter().filter(|(k, _)| self.contains(*k)).map(|(_, n)| n))
            .finish()
    }
}

/// A validated input intent for one player and one tick.
///
/// `InputIntent::default()` is the neutral intent: no keys, keep the current
/// orientation, no shot, no build.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputIntent {
    pub keys: KeyState,
    /// New facing direction in `[0, 2π)`, or `None` to keep the current one.
    pub orientation: Option<f32>,
    pub shot: bool,
    pub build: bool,
    /// Client clock, passed through for the snapshot. Not used for ordering.
    pub client_ts: Option<u64>,
}

impl InputIntent {
    /// The intent a player gets for a tick in which they sent nothing.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }

    /// Checks a raw intent and returns the sanitized intent alongside what was
    /// wrong with it.
    pub fn sanitize(raw: &RawIntent) -> (Self, MalformedIntent) {
        let mut malformed = MalformedIntent::default();

        let mut keys = KeyState::empty();
        match &raw.keyboard_state {
            Lenient::Valid(held) => {
                for name in held.held() {
                    match KeyState::from_name(name) {
                        Some(key) => keys.insert(key),
                        None => malformed.unknown_keys += 1,
                    }
                }
            }
            Lenient::Invalid => malformed.bad_keys = true,
        }

        let orientation = match &raw.orientation {
            Lenient::Valid(None) => None,
            Lenient::Valid(Some(sent)) => {
                let angle = sent.radians().and_then(normalize_angle);
                malformed.bad_orientation = angle.is_none();
                angle
            }
            Lenient::Invalid => {
                malformed.bad_orientation = true;
                None
            }
        };

        let client_ts = match raw.timestamp {
            Lenient::Valid(ts) => ts,
            Lenient::Invalid => {
                malformed.bad_timestamp = true;
                None
            }
        };

        let intent = Self {
            keys,
            orientation,
            shot: flag(raw.shot, &mut malformed.bad_shot),
            build: flag(raw.build, &mut malformed.bad_build),
            client_ts,
        };
        (intent, malformed)
    }
}

/// Maps an angle into `[0, 2π)`. Non-finite or huge angles yield `None`.
fn normalize_angle(angle: f64) -> Option<f32> {
    if !angle.is_finite() || angle.abs() > MAX_ORIENTATION {
        return None;
    }
    let normalized = angle.rem_euclid(TAU as f64) as f32;
    // Rounding to f32 can land exactly on 2π.
    Some(if normalized >= TAU { 0.0 } else { normalized })
}

fn flag(field: Lenient<bool>, bad: &mut bool) -> bool {
    match field {
        Lenient::Valid(value) => value,
        Lenient::Invalid => {
            *bad = true;
            false
        }
    }
}

/// What sanitizing had to discard from a raw intent.
///
/// Each discarded field fell back to its neutral value; the rest of the
/// intent still applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MalformedIntent {
    /// Key names that aren't movement keys.
    pub unknown_keys: usize,
    /// The key state was neither a list nor a map of flags.
    pub bad_keys: bool,
    /// Orientation was out of shape, non-finite, a zero vector or out of
    /// range, and was ignored.
    pub bad_orientation: bool,
    pub bad_shot: bool,
    pub bad_build: bool,
    pub bad_timestamp: bool,
}

impl MalformedIntent {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use browsercraft_protocol::{RawKeys, RawOrientation};

    use super::*;

    fn raw(keys: &[&str], orientation: Option<f64>) -> RawIntent {
        RawIntent {
            keyboard_state: RawKeys::from(keys).into(),
            orientation: orientation.map(RawOrientation::Angle).into(),
            shot: false.into(),
            build: false.into(),
            timestamp: Some(100).into(),
        }
    }

    #[test]
    fn test_neutral_intent() {
        let n = InputIntent::neutral();
        assert!(n.keys.is_empty());
        assert_eq!(n.orientation, None);
        assert!(!n.shot && !n.build);
        assert!(n.is_neutral());
    }

    #[test]
    fn test_keys_map_to_axes() {
        assert_eq!(KeyState::UP.axis(), (0, -1));
        assert_eq!((KeyState::DOWN | KeyState::RIGHT).axis(), (1, 1));
        assert_eq!((KeyState::LEFT | KeyState::RIGHT).axis(), (0, 0));
    }

    #[test]
    fn test_sanitize_well_formed() {
        let (intent, malformed) = InputIntent::sanitize(&raw(&["up", "LEFT"], Some(1.5)));
        assert!(malformed.is_empty());
        assert!(intent.keys.contains(KeyState::UP));
        assert!(intent.keys.contains(KeyState::LEFT));
        assert_eq!(intent.orientation, Some(1.5));
        assert_eq!(intent.client_ts, Some(100));
    }

    #[test]
    fn test_sanitize_drops_unknown_keys() {
        let (intent, malformed) = InputIntent::sanitize(&raw(&["up", "jump", "fly"], None));
        assert_eq!(malformed.unknown_keys, 2);
        assert_eq!(intent.keys, KeyState::UP);
    }

    #[test]
    fn test_sanitize_normalizes_orientation() {
        let (intent, _) = InputIntent::sanitize(&raw(&[], Some(-std::f64::consts::FRAC_PI_2)));
        let o = intent.orientation.unwrap();
        assert!((o - 3.0 * std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_sanitize_rejects_huge_orientation() {
        let (intent, malformed) = InputIntent::sanitize(&raw(&[], Some(1.0e300)));
        assert!(malformed.bad_orientation);
        assert_eq!(intent.orientation, None);
    }

    #[test]
    fn test_sanitize_rejects_non_finite_orientation() {
        let (intent, malformed) = InputIntent::sanitize(&raw(&[], Some(f64::NAN)));
        assert!(malformed.bad_orientation);
        assert_eq!(intent.orientation, None);
    }

    #[test]
    fn test_keystate_debug_lists_names() {
        assert_eq!(format!("{:?}", KeyState::UP | KeyState::RIGHT), "{\"up\", \"right\"}");
    }

    #[test]
    fn test_sanitize_vector_orientation() {
        let mut intent = raw(&["up"], None);
        intent.orientation = Some(RawOrientation::Vector { x: 0.0, y: -2.0 }).into();
        let (intent, malformed) = InputIntent::sanitize(&intent);
        assert!(malformed.is_empty());
        let o = intent.orientation.unwrap();
        assert!((o - 3.0 * std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_sanitize_zero_vector_is_ignored() {
        let mut intent = raw(&[], None);
        intent.orientation = Some(RawOrientation::Vector { x: 0.0, y: 0.0 }).into();
        let (intent, malformed) = InputIntent::sanitize(&intent);
        assert!(malformed.bad_orientation);
        assert_eq!(intent.orientation, None);
    }

    #[test]
    fn test_sanitize_out_of_shape_fields_fall_back_individually() {
        let sent = RawIntent {
            keyboard_state: RawKeys::from(&["up"][..]).into(),
            orientation: Lenient::Invalid,
            shot: Lenient::Invalid,
            build: true.into(),
            timestamp: Lenient::Invalid,
        };
        let (intent, malformed) = InputIntent::sanitize(&sent);

        assert_eq!(intent.keys, KeyState::UP);
        assert!(intent.build);
        assert!(!intent.shot);
        assert_eq!(intent.orientation, None);
        assert_eq!(intent.client_ts, None);
        assert!(malformed.bad_shot && malformed.bad_orientation && malformed.bad_timestamp);
        assert!(!malformed.bad_build && !malformed.bad_keys);
    }

    #[test]
    fn test_sanitize_bad_key_state_means_no_keys() {
        let sent = RawIntent {
            keyboard_state: Lenient::Invalid,
            shot: true.into(),
            ..RawIntent::default()
        };
        let (intent, malformed) = InputIntent::sanitize(&sent);
        assert!(malformed.bad_keys);
        assert!(intent.keys.is_empty());
        assert!(intent.shot);
    }
}
