//! Key binding parser — "Ctrl+Alt+KP_Add|KP_Plus" → (modifiers, key names).
//!
//! Bindings are matched against the keysym *names* the input source
//! reports, not keycodes. The same physical key can report a different
//! name depending on which modifiers are down (X11 reports `Pause` as
//! `Break` under Ctrl, and keypad keys as `KP_End`/`KP_1` depending on
//! NumLock), so a binding may list alternative names separated by `|`.

use crate::command::Command;

use super::HotkeyError;

/// X11 keysym value.
pub type Keysym = u32;

/// Held state of the two modifiers the decoder cares about.
///
/// A flag is set while any physical key for it is down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const CTRL: Self = Self {
        ctrl: true,
        alt: false,
    };

    fn is_empty(self) -> bool {
        !self.ctrl && !self.alt
    }
}

/// A modifier key the decoder tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Ctrl,
    Alt,
}

/// A parsed key binding.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Exact modifier combination required (strict equality).
    pub modifiers: Modifiers,
    /// Accepted reported names for the trigger key.
    pub keys: Vec<String>,
    /// Original user-provided string.
    pub raw: String,
}

impl Binding {
    /// Whether a DOWN of `key` under `held` fires this binding.
    pub fn matches(&self, held: Modifiers, key: &str) -> bool {
        held == self.modifiers && self.keys.iter().any(|k| k == key)
    }
}

/// Parse a key binding specification string.
///
/// Format: `Modifier[+Modifier...]+Key[|Alias...]`
///
/// Modifiers: `Ctrl`/`Control`, `Alt`. Keys are X11 keysym names
/// (`KP_Add`, `Pause`, `F5`, `a`, ...), matched case-insensitively and
/// stored in their canonical spelling.
///
/// At least one modifier is required, and modifier keys cannot be used
/// as the trigger.
pub fn parse_binding(spec: &str) -> Result<Binding, HotkeyError> {
    let parts: Vec<&str> = spec.split('+').map(str::trim).collect();

    if parts.iter().all(|p| p.is_empty()) {
        return Err(HotkeyError::InvalidBinding("empty binding".into()));
    }
    if parts.len() < 2 {
        return Err(HotkeyError::InvalidBinding(format!(
            "bare key without modifier: {spec:?}"
        )));
    }

    let (modifier_parts, key_part) = parts.split_at(parts.len() - 1);

    let mut modifiers = Modifiers::default();
    for &m in modifier_parts {
        match parse_modifier(m) {
            Some(Modifier::Ctrl) => modifiers.ctrl = true,
            Some(Modifier::Alt) => modifiers.alt = true,
            None => {
                return Err(HotkeyError::InvalidBinding(format!(
                    "unknown modifier: {m:?}"
                )));
            }
        }
    }
    if modifiers.is_empty() {
        return Err(HotkeyError::InvalidBinding(format!(
            "no valid modifiers in: {spec:?}"
        )));
    }

    let mut keys = Vec::new();
    for alias in key_part[0].split('|').map(str::trim) {
        let name = canonical_key_name(alias)
            .ok_or_else(|| HotkeyError::InvalidBinding(format!("unknown key: {alias:?}")))?;
        if modifier_for_key(&name).is_some() {
            return Err(HotkeyError::InvalidBinding(format!(
                "modifier {name:?} cannot be a trigger key"
            )));
        }
        if !keys.contains(&name) {
            keys.push(name);
        }
    }

    Ok(Binding {
        modifiers,
        keys,
        raw: spec.to_string(),
    })
}

/// Parse a modifier name.
fn parse_modifier(name: &str) -> Option<Modifier> {
    match name.to_ascii_lowercase().as_str() {
        "control" | "ctrl" => Some(Modifier::Ctrl),
        "alt" | "mod1" => Some(Modifier::Alt),
        _ => None,
    }
}

/// One physical modifier key: the flag it drives and its bit in the
/// set of held keys for that flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierKey {
    pub modifier: Modifier,
    pub bit: u8,
}

/// Classify a reported key name as one of the tracked modifier keys.
///
/// Left and right variants drive the same flag but carry distinct bits,
/// so releasing one while the other is held keeps the flag set.
pub fn modifier_for_key(name: &str) -> Option<ModifierKey> {
    let (modifier, bit) = match name {
        "Control_L" => (Modifier::Ctrl, 0b0001),
        "Control_R" => (Modifier::Ctrl, 0b0010),
        "Alt_L" => (Modifier::Alt, 0b0001),
        "Alt_R" => (Modifier::Alt, 0b0010),
        "Meta_L" => (Modifier::Alt, 0b0100),
        "Meta_R" => (Modifier::Alt, 0b1000),
        _ => return None,
    };
    Some(ModifierKey { modifier, bit })
}

/// Map a keypad key name to its digit.
///
/// Accepts both the NumLock-on names (`KP_0`..`KP_9`) and the
/// navigation names the same keys report with NumLock off.
pub fn keypad_digit(name: &str) -> Option<u8> {
    let digit = match name {
        "KP_0" | "KP_Insert" => 0,
        "KP_1" | "KP_End" => 1,
        "KP_2" | "KP_Down" => 2,
        "KP_3" | "KP_Next" | "KP_Page_Down" => 3,
        "KP_4" | "KP_Left" => 4,
        "KP_5" | "KP_Begin" => 5,
        "KP_6" | "KP_Right" => 6,
        "KP_7" | "KP_Home" => 7,
        "KP_8" | "KP_Up" => 8,
        "KP_9" | "KP_Prior" | "KP_Page_Up" => 9,
        _ => return None,
    };
    Some(digit)
}

/// Named keysyms known to the binding parser and the input source.
const NAMED_KEYSYMS: &[(Keysym, &str)] = &[
    (0xffe1, "Shift_L"),
    (0xffe2, "Shift_R"),
    (0xffe3, "Control_L"),
    (0xffe4, "Control_R"),
    (0xffe7, "Meta_L"),
    (0xffe8, "Meta_R"),
    (0xffe9, "Alt_L"),
    (0xffea, "Alt_R"),
    (0xffeb, "Super_L"),
    (0xffec, "Super_R"),
    (0xfe03, "ISO_Level3_Shift"),
    (0xffb0, "KP_0"),
    (0xffb1, "KP_1"),
    (0xffb2, "KP_2"),
    (0xffb3, "KP_3"),
    (0xffb4, "KP_4"),
    (0xffb5, "KP_5"),
    (0xffb6, "KP_6"),
    (0xffb7, "KP_7"),
    (0xffb8, "KP_8"),
    (0xffb9, "KP_9"),
    (0xff9e, "KP_Insert"),
    (0xff9c, "KP_End"),
    (0xff99, "KP_Down"),
    (0xff9b, "KP_Next"),
    (0xff96, "KP_Left"),
    (0xff9d, "KP_Begin"),
    (0xff98, "KP_Right"),
    (0xff95, "KP_Home"),
    (0xff97, "KP_Up"),
    (0xff9a, "KP_Prior"),
    (0xff9f, "KP_Delete"),
    (0xffae, "KP_Decimal"),
    (0xff8d, "KP_Enter"),
    (0xffab, "KP_Add"),
    (0xffad, "KP_Subtract"),
    (0xffaa, "KP_Multiply"),
    (0xffaf, "KP_Divide"),
    (0xff13, "Pause"),
    (0xff6b, "Break"),
    (0xff61, "Print"),
    (0xff15, "Sys_Req"),
    (0xff14, "Scroll_Lock"),
    (0xff7f, "Num_Lock"),
    (0xffe5, "Caps_Lock"),
    (0x0020, "space"),
    (0x002a, "asterisk"),
    (0x002b, "plus"),
    (0x002d, "minus"),
    (0x002f, "slash"),
    (0x003d, "equal"),
    (0xff0d, "Return"),
    (0xff1b, "Escape"),
    (0xff09, "Tab"),
    (0xff08, "BackSpace"),
    (0xffff, "Delete"),
    (0xff63, "Insert"),
    (0xff50, "Home"),
    (0xff57, "End"),
    (0xff55, "Prior"),
    (0xff56, "Next"),
    (0xff52, "Up"),
    (0xff54, "Down"),
    (0xff51, "Left"),
    (0xff53, "Right"),
];

/// Name reported for a keysym, or `None` for keysyms we don't name.
///
/// ASCII letters and digits map to themselves (lowercase), F1–F12 to
/// `F<n>`, everything else through [`NAMED_KEYSYMS`].
pub fn keysym_name(keysym: Keysym) -> Option<String> {
    if let Some(ch) = char::from_u32(keysym)
        && (ch.is_ascii_lowercase() || ch.is_ascii_digit())
    {
        return Some(ch.to_string());
    }
    if (0xffbe..=0xffc9).contains(&keysym) {
        return Some(format!("F{}", keysym - 0xffbe + 1));
    }
    NAMED_KEYSYMS
        .iter()
        .find(|(sym, _)| *sym == keysym)
        .map(|(_, name)| (*name).to_string())
}

/// Canonical spelling of a user-typed key name.
fn canonical_key_name(name: &str) -> Option<String> {
    if name.len() == 1 {
        let ch = name.chars().next()?;
        if ch.is_ascii_alphanumeric() {
            return Some(ch.to_ascii_lowercase().to_string());
        }
    }

    if let Some(rest) = name.strip_prefix('F').or_else(|| name.strip_prefix('f'))
        && let Ok(n) = rest.parse::<u32>()
        && (1..=12).contains(&n)
    {
        return Some(format!("F{n}"));
    }

    NAMED_KEYSYMS
        .iter()
        .find(|(_, known)| known.eq_ignore_ascii_case(name))
        .map(|(_, known)| (*known).to_string())
}

/// Fixed hotkey table: each binding decodes to exactly one command.
#[derive(Debug, Clone)]
pub struct HotkeyTable {
    entries: Vec<(Binding, Command)>,
}

impl HotkeyTable {
    /// Build a table, rejecting overlapping bindings and bindings that
    /// would swallow Ctrl+keypad digit entry.
    pub fn new(entries: Vec<(Binding, Command)>) -> Result<Self, HotkeyError> {
        for (i, (binding, _)) in entries.iter().enumerate() {
            if binding.modifiers == Modifiers::CTRL
                && let Some(key) = binding.keys.iter().find(|k| keypad_digit(k).is_some())
            {
                return Err(HotkeyError::InvalidBinding(format!(
                    "{:?}: Ctrl+{key} is reserved for temperature entry",
                    binding.raw
                )));
            }
            for (other, _) in &entries[..i] {
                if other.modifiers == binding.modifiers
                    && other.keys.iter().any(|k| binding.keys.contains(k))
                {
                    return Err(HotkeyError::InvalidBinding(format!(
                        "{:?} overlaps {:?}",
                        binding.raw, other.raw
                    )));
                }
            }
        }
        Ok(Self { entries })
    }

    /// Parse the four configurable bindings into a table.
    pub fn from_specs(
        toggle: &str,
        status: &str,
        power_on: &str,
        power_off: &str,
    ) -> Result<Self, HotkeyError> {
        Self::new(vec![
            (parse_binding(toggle)?, Command::ToggleOrNot),
            (parse_binding(status)?, Command::VoiceStatus),
            (parse_binding(power_on)?, Command::PowerOn),
            (parse_binding(power_off)?, Command::PowerOff),
        ])
    }

    /// First command whose binding fires for `key` under `held`.
    pub fn lookup(&self, held: Modifiers, key: &str) -> Option<Command> {
        self.entries
            .iter()
            .find(|(binding, _)| binding.matches(held, key))
            .map(|(_, command)| *command)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &(Binding, Command)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTRL_ALT: Modifiers = Modifiers {
        ctrl: true,
        alt: true,
    };

    fn table(toggle: &str, status: &str) -> Result<HotkeyTable, HotkeyError> {
        HotkeyTable::from_specs(toggle, status, "Ctrl+Alt+KP_Add", "Ctrl+Alt+KP_Subtract")
    }

    #[test]
    fn parse_modifier_control() {
        assert_eq!(parse_modifier("Control"), Some(Modifier::Ctrl));
        assert_eq!(parse_modifier("Ctrl"), Some(Modifier::Ctrl));
        assert_eq!(parse_modifier("ctrl"), Some(Modifier::Ctrl));
    }

    #[test]
    fn parse_modifier_alt() {
        assert_eq!(parse_modifier("Alt"), Some(Modifier::Alt));
        assert_eq!(parse_modifier("alt"), Some(Modifier::Alt));
    }

    #[test]
    fn parse_modifier_unknown_returns_none() {
        assert_eq!(parse_modifier("Super"), None);
        assert_eq!(parse_modifier("Shift"), None);
        assert_eq!(parse_modifier(""), None);
    }

    #[test]
    fn parse_ctrl_binding() {
        let b = parse_binding("Ctrl+KP_Enter").unwrap();
        assert_eq!(b.modifiers, Modifiers::CTRL);
        assert_eq!(b.keys, vec!["KP_Enter".to_string()]);
        assert_eq!(b.raw, "Ctrl+KP_Enter");
    }

    #[test]
    fn parse_binding_with_aliases_canonicalizes() {
        let b = parse_binding("control+alt+pause|BREAK").unwrap();
        assert_eq!(b.modifiers, CTRL_ALT);
        assert_eq!(b.keys, vec!["Pause".to_string(), "Break".to_string()]);
    }

    #[test]
    fn parse_binding_letters_and_function_keys() {
        assert_eq!(parse_binding("Alt+T").unwrap().keys, vec!["t".to_string()]);
        assert_eq!(parse_binding("Ctrl+f5").unwrap().keys, vec!["F5".to_string()]);
    }

    #[test]
    fn parse_binding_rejects_bare_key() {
        let err = parse_binding("KP_Add").unwrap_err();
        assert!(err.to_string().contains("bare key"));
    }

    #[test]
    fn parse_binding_rejects_empty() {
        assert!(parse_binding("").is_err());
    }

    #[test]
    fn parse_binding_rejects_unknown_parts() {
        assert!(parse_binding("Hyper+KP_Add").is_err());
        assert!(parse_binding("Ctrl+NotAKey").is_err());
        assert!(parse_binding("Ctrl+KP_Add|Bogus").is_err());
    }

    #[test]
    fn parse_binding_rejects_modifier_trigger() {
        let err = parse_binding("Ctrl+Alt_L").unwrap_err();
        assert!(err.to_string().contains("cannot be a trigger"));
    }

    #[test]
    fn binding_match_is_strict_equality() {
        let b = parse_binding("Ctrl+KP_Enter").unwrap();
        assert!(b.matches(Modifiers::CTRL, "KP_Enter"));
        assert!(!b.matches(CTRL_ALT, "KP_Enter"));
        assert!(!b.matches(Modifiers::default(), "KP_Enter"));
        assert!(!b.matches(Modifiers::CTRL, "KP_Add"));
    }

    #[test]
    fn left_and_right_modifiers_share_flag_with_distinct_bits() {
        let left = modifier_for_key("Control_L").unwrap();
        let right = modifier_for_key("Control_R").unwrap();
        assert_eq!(left.modifier, Modifier::Ctrl);
        assert_eq!(right.modifier, Modifier::Ctrl);
        assert_ne!(left.bit, right.bit);

        let alts: Vec<_> = ["Alt_L", "Alt_R", "Meta_L", "Meta_R"]
            .iter()
            .map(|k| modifier_for_key(k).unwrap())
            .collect();
        assert!(alts.iter().all(|k| k.modifier == Modifier::Alt));
        let bits = alts.iter().fold(0u8, |acc, k| acc | k.bit);
        assert_eq!(bits.count_ones(), 4);

        assert_eq!(modifier_for_key("Shift_L"), None);
    }

    #[test]
    fn keypad_digits_under_both_numlock_states() {
        assert_eq!(keypad_digit("KP_2"), Some(2));
        assert_eq!(keypad_digit("KP_Down"), Some(2));
        assert_eq!(keypad_digit("KP_0"), Some(0));
        assert_eq!(keypad_digit("KP_Insert"), Some(0));
        assert_eq!(keypad_digit("KP_Prior"), Some(9));
        assert_eq!(keypad_digit("2"), None);
        assert_eq!(keypad_digit("KP_Add"), None);
    }

    #[test]
    fn keysym_names() {
        assert_eq!(keysym_name(0x61).as_deref(), Some("a"));
        assert_eq!(keysym_name(0x35).as_deref(), Some("5"));
        assert_eq!(keysym_name(0xffbe).as_deref(), Some("F1"));
        assert_eq!(keysym_name(0xffc9).as_deref(), Some("F12"));
        assert_eq!(keysym_name(0xffe3).as_deref(), Some("Control_L"));
        assert_eq!(keysym_name(0xff9c).as_deref(), Some("KP_End"));
        assert_eq!(keysym_name(0x41), None); // uppercase 'A' is a shifted level
        assert_eq!(keysym_name(0x1234_5678), None);
    }

    #[test]
    fn table_lookup() {
        let table = table("Ctrl+KP_Enter", "Ctrl+KP_Multiply").unwrap();
        assert_eq!(
            table.lookup(Modifiers::CTRL, "KP_Enter"),
            Some(Command::ToggleOrNot)
        );
        assert_eq!(
            table.lookup(CTRL_ALT, "KP_Add"),
            Some(Command::PowerOn)
        );
        assert_eq!(table.lookup(Modifiers::CTRL, "KP_Add"), None);
        assert_eq!(table.bindings().count(), 4);
    }

    #[test]
    fn table_rejects_overlap() {
        let err = table("Ctrl+Pause", "Ctrl+Pause|Break").unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn table_allows_same_key_under_different_modifiers() {
        assert!(table("Ctrl+Pause", "Ctrl+Alt+Pause").is_ok());
    }

    #[test]
    fn table_rejects_ctrl_keypad_digit() {
        let err = table("Ctrl+KP_End", "Ctrl+KP_Multiply").unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }
}
