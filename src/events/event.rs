//! Events delivered to the server thread
//!
//! Input arrives from the native side already translated into protocol
//! shaped events. Host notifications (window moved, surface destroyed, ...)
//! travel the same queue as [`ClientMessage`]s so that ordering against
//! input is preserved.

use bitflags::bitflags;
use tracing::warn;

bitflags! {
    /// Modifier and pointer button state carried by input events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CAPS_LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const OPTION = 1 << 3;
        const COMMAND = 1 << 4;
        const FUNCTION = 1 << 5;
        const BUTTON1 = 1 << 8;
        const BUTTON2 = 1 << 9;
        const BUTTON3 = 1 << 10;
    }
}

impl Modifiers {
    /// Keyboard modifiers only, without button state
    pub const KEYS: Modifiers = Modifiers::SHIFT
        .union(Modifiers::CAPS_LOCK)
        .union(Modifiers::CONTROL)
        .union(Modifiers::OPTION)
        .union(Modifiers::COMMAND)
        .union(Modifiers::FUNCTION);

    /// Parse a modifier list such as `"command+shift"` or `"option, control"`.
    ///
    /// Names may be separated by any of ` ,+&|/` and are matched case
    /// insensitively. `"none"` and the empty string yield no modifiers;
    /// unknown names are skipped with a warning.
    pub fn parse_list(list: &str) -> Modifiers {
        let mut mods = Modifiers::empty();
        for name in list.split(|c: char| " ,+&|/".contains(c)).filter(|s| !s.is_empty()) {
            match name.to_ascii_lowercase().as_str() {
                "shift" => mods |= Modifiers::SHIFT,
                "control" | "ctrl" => mods |= Modifiers::CONTROL,
                "option" | "alt" => mods |= Modifiers::OPTION,
                "command" | "cmd" => mods |= Modifiers::COMMAND,
                "fn" | "function" => mods |= Modifiers::FUNCTION,
                "none" => {}
                other => warn!("Unknown modifier name {:?} in {:?}", other, list),
            }
        }
        mods
    }
}

/// Client message types understood by the server loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Quit,
    Activate,
    Deactivate,
    DisplayChanged,
    /// args: native window id, new state bits
    WindowState,
    /// args: native window id
    WindowMoved,
    /// args: native surface id
    SurfaceChanged,
    /// args: native surface id
    SurfaceDestroyed,
    /// args: nonzero to go rootless, zero to show the root window
    SetRootless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientMessage {
    pub kind: MessageKind,
    pub args: [u32; 4],
}

impl ClientMessage {
    /// Build a message; at most four arguments are kept, missing ones are 0
    pub fn new(kind: MessageKind, args: &[u32]) -> Self {
        let mut packed = [0u32; 4];
        for (slot, arg) in packed.iter_mut().zip(args) {
            *slot = *arg;
        }
        if args.len() > packed.len() {
            warn!("Client message {:?} truncated to {} arguments", kind, packed.len());
        }
        Self { kind, args: packed }
    }
}

/// One queued event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Pointer moved to native screen coordinates
    Motion { x: i32, y: i32, state: Modifiers, time: u32 },
    ButtonPress { button: u8, x: i32, y: i32, state: Modifiers, time: u32 },
    ButtonRelease { button: u8, x: i32, y: i32, state: Modifiers, time: u32 },
    KeyPress { keycode: u8, state: Modifiers, time: u32 },
    KeyRelease { keycode: u8, state: Modifiers, time: u32 },
    /// Modifier state changed without a key event
    ModifiersChanged { state: Modifiers, time: u32 },
    Client(ClientMessage),
}

impl InputEvent {
    pub fn is_motion(&self) -> bool {
        matches!(self, InputEvent::Motion { .. })
    }

    /// Modifier state carried by the event; client messages have none
    pub fn state(&self) -> Option<Modifiers> {
        match *self {
            InputEvent::Motion { state, .. }
            | InputEvent::ButtonPress { state, .. }
            | InputEvent::ButtonRelease { state, .. }
            | InputEvent::KeyPress { state, .. }
            | InputEvent::KeyRelease { state, .. }
            | InputEvent::ModifiersChanged { state, .. } => Some(state),
            InputEvent::Client(_) => None,
        }
    }

    fn state_mut(&mut self) -> Option<&mut Modifiers> {
        match self {
            InputEvent::Motion { state, .. }
            | InputEvent::ButtonPress { state, .. }
            | InputEvent::ButtonRelease { state, .. }
            | InputEvent::KeyPress { state, .. }
            | InputEvent::KeyRelease { state, .. }
            | InputEvent::ModifiersChanged { state, .. } => Some(state),
            InputEvent::Client(_) => None,
        }
    }

    /// Replace the modifier state, if the event carries one
    pub fn with_state(mut self, new_state: Modifiers) -> Self {
        if let Some(state) = self.state_mut() {
            *state = new_state;
        }
        self
    }

    pub fn message(kind: MessageKind, args: &[u32]) -> Self {
        InputEvent::Client(ClientMessage::new(kind, args))
    }
}
