//! Customizable keyboard shortcuts for the editor.
//!
//! Bindings map a key plus modifier state to a [`KeyAction`]. The pan key is
//! special: it is held rather than pressed, so it is tracked separately.

use serde::{Deserialize, Serialize};

/// Keys the editor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    A,
    E,
    R,
    Y,
    Z,
    Key0,
    Space,
    Escape,
    BracketLeft,
    BracketRight,
    Minus,
    Equal,
}

/// Modifier state at the time of a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        shift: false,
        alt: false,
    };
    pub const CTRL: Modifiers = Modifiers {
        ctrl: true,
        shift: false,
        alt: false,
    };
    pub const CTRL_SHIFT: Modifiers = Modifiers {
        ctrl: true,
        shift: true,
        alt: false,
    };
}

/// A key together with the modifiers that must be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCombo {
    pub key: KeyCode,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl KeyCombo {
    pub const fn new(key: KeyCode, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }
}

/// What a shortcut does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    Undo,
    Redo,
    BrushSmaller,
    BrushLarger,
    ToggleEraser,
    ZoomIn,
    ZoomOut,
    ZoomReset,
    /// Drop the stroke being drawn
    CancelStroke,
}

impl KeyAction {
    pub fn description(&self) -> &'static str {
        match self {
            KeyAction::Undo => "Undo",
            KeyAction::Redo => "Redo",
            KeyAction::BrushSmaller => "Decrease brush size",
            KeyAction::BrushLarger => "Increase brush size",
            KeyAction::ToggleEraser => "Toggle eraser",
            KeyAction::ZoomIn => "Zoom in",
            KeyAction::ZoomOut => "Zoom out",
            KeyAction::ZoomReset => "Reset zoom",
            KeyAction::CancelStroke => "Cancel stroke",
        }
    }
}

/// Keybinding configuration for the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBindings {
    /// Held to pan the stage with the pointer
    pub pan: KeyCode,
    pub shortcuts: Vec<(KeyCombo, KeyAction)>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        use KeyAction::*;
        use KeyCode::*;
        let bind = |key, modifiers, action| (KeyCombo::new(key, modifiers), action);
        Self {
            pan: Space,
            shortcuts: vec![
                bind(Z, Modifiers::CTRL, Undo),
                bind(Y, Modifiers::CTRL, Redo),
                bind(Z, Modifiers::CTRL_SHIFT, Redo),
                bind(BracketLeft, Modifiers::NONE, BrushSmaller),
                bind(BracketRight, Modifiers::NONE, BrushLarger),
                bind(E, Modifiers::NONE, ToggleEraser),
                bind(Equal, Modifiers::CTRL, ZoomIn),
                bind(Minus, Modifiers::CTRL, ZoomOut),
                bind(Key0, Modifiers::CTRL, ZoomReset),
                bind(Escape, Modifiers::NONE, CancelStroke),
            ],
        }
    }
}

impl KeyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The action bound to a key press, if any. Modifiers must match exactly.
    pub fn action_for(&self, key: KeyCode, modifiers: Modifiers) -> Option<KeyAction> {
        self.shortcuts
            .iter()
            .find(|(combo, _)| combo.key == key && combo.modifiers == modifiers)
            .map(|(_, action)| *action)
    }

    /// All combos bound to an action.
    pub fn combos_for(&self, action: KeyAction) -> Vec<KeyCombo> {
        self.shortcuts
            .iter()
            .filter(|(_, a)| *a == action)
            .map(|(combo, _)| *combo)
            .collect()
    }

    /// Bind a combo, replacing whatever it was bound to before.
    pub fn bind(&mut self, combo: KeyCombo, action: KeyAction) {
        self.shortcuts.retain(|(c, _)| *c != combo);
        self.shortcuts.push((combo, action));
    }

    pub fn unbind(&mut self, combo: KeyCombo) {
        self.shortcuts.retain(|(c, _)| *c != combo);
    }

    /// What a combo is already used for, if anything.
    pub fn key_conflict(&self, combo: KeyCombo) -> Option<String> {
        if combo.key == self.pan {
            return Some("Pan".to_string());
        }
        self.shortcuts
            .iter()
            .find(|(c, _)| *c == combo)
            .map(|(_, action)| action.description().to_string())
    }
}

/// Convert a KeyCode to a display string.
pub fn key_to_string(key: KeyCode) -> &'static str {
    match key {
        KeyCode::A => "A",
        KeyCode::E => "E",
        KeyCode::R => "R",
        KeyCode::Y => "Y",
        KeyCode::Z => "Z",
        KeyCode::Key0 => "0",
        KeyCode::Space => "Space",
        KeyCode::Escape => "Esc",
        KeyCode::BracketLeft => "[",
        KeyCode::BracketRight => "]",
        KeyCode::Minus => "-",
        KeyCode::Equal => "=",
    }
}

/// Display string for a combo, e.g. `Ctrl+Shift+Z`.
pub fn combo_to_string(combo: &KeyCombo) -> String {
    let mut parts = Vec::new();
    if combo.modifiers.ctrl {
        parts.push("Ctrl");
    }
    if combo.modifiers.shift {
        parts.push("Shift");
    }
    if combo.modifiers.alt {
        parts.push("Alt");
    }
    parts.push(key_to_string(combo.key));
    parts.join("+")
}
