//! Input dispatch
//!
//! Turns queued native input into what the protocol layer sees. The host
//! reports modifier state as flags, so modifier key presses and releases
//! are synthesized whenever the flags change. A single-button mouse can
//! emulate buttons 2 and 3 by holding configured modifiers while clicking;
//! the emulating modifiers are hidden from clients for as long as the
//! button is down.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::config::InputConfig;
use crate::events::event::{ClientMessage, InputEvent, MessageKind, Modifiers};
use crate::shared::Point;

/// Offset from native to protocol keycodes
pub const MIN_KEYCODE: u8 = 8;

/// Native keycodes of the modifier keys
pub const MODIFIER_KEYS: [(Modifiers, u8); 6] = [
    (Modifiers::COMMAND, 55),
    (Modifiers::SHIFT, 56),
    (Modifiers::CAPS_LOCK, 57),
    (Modifiers::OPTION, 58),
    (Modifiers::CONTROL, 59),
    (Modifiers::FUNCTION, 63),
];

fn is_modifier_key(keycode: u8) -> bool {
    MODIFIER_KEYS.iter().any(|&(_, key)| key == keycode)
}

/// Receiver of dispatched input, normally the protocol layer
pub trait InputSink {
    /// Pointer moved to protocol screen coordinates
    fn motion(&mut self, x: i32, y: i32, time: u32);

    fn button(&mut self, button: u8, pressed: bool, x: i32, y: i32, state: Modifiers, time: u32);

    /// `keycode` is a protocol keycode
    fn key(&mut self, keycode: u8, pressed: bool, state: Modifiers, time: u32);
}

/// Fake-button configuration resolved from [`InputConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FakeButtons {
    pub enabled: bool,
    pub button2: Modifiers,
    pub button3: Modifiers,
}

impl FakeButtons {
    pub fn from_config(config: &InputConfig) -> Self {
        Self {
            enabled: config.fake_buttons,
            button2: Modifiers::parse_list(&config.fake_button2),
            button3: Modifiers::parse_list(&config.fake_button3),
        }
    }
}

pub struct InputDispatcher {
    fake: FakeButtons,
    /// Button being emulated, 0 when none
    fake_button: u8,
    /// Modifiers hidden while the emulated button is down
    fake_mask: Modifiers,
    current_flags: Modifiers,
    keys_down: BTreeSet<u8>,
    origin: Point,
    last_time: u32,
}

impl InputDispatcher {
    pub fn new(fake: FakeButtons, origin: Point) -> Self {
        Self {
            fake,
            fake_button: 0,
            fake_mask: Modifiers::empty(),
            current_flags: Modifiers::empty(),
            keys_down: BTreeSet::new(),
            origin,
            last_time: 0,
        }
    }

    /// Native coordinates of the protocol screen origin
    pub fn set_origin(&mut self, origin: Point) {
        self.origin = origin;
    }

    pub fn current_flags(&self) -> Modifiers {
        self.current_flags
    }

    pub fn is_key_down(&self, keycode: u8) -> bool {
        self.keys_down.contains(&keycode)
    }

    /// Deliver `event` to `sink`. Client messages come back to the caller
    /// after any input side effects (deactivation releases held keys).
    pub fn dispatch(&mut self, event: InputEvent, sink: &mut dyn InputSink) -> Option<ClientMessage> {
        if let InputEvent::Client(msg) = event {
            if msg.kind == MessageKind::Deactivate {
                self.release_keys(sink);
            }
            return Some(msg);
        }

        let real_state = event.state().unwrap_or_default();
        if let InputEvent::ButtonPress { button: 1, .. } = event {
            self.begin_fake_button(real_state);
        }

        let visible = self.visible_state(real_state);
        self.sync_modifiers(visible & Modifiers::KEYS, sink);

        match event {
            InputEvent::Motion { x, y, time, .. } => {
                self.last_time = time;
                sink.motion(x - self.origin.x, y - self.origin.y, time);
            }
            InputEvent::ButtonPress { button, x, y, time, .. } => {
                self.last_time = time;
                let button = self.emulated(button);
                sink.button(button, true, x - self.origin.x, y - self.origin.y, visible, time);
            }
            InputEvent::ButtonRelease { button, x, y, time, .. } => {
                self.last_time = time;
                let emulated = self.emulated(button);
                sink.button(emulated, false, x - self.origin.x, y - self.origin.y, visible, time);
                if button == 1 && self.fake_button != 0 {
                    trace!("Fake button {} released", self.fake_button);
                    self.fake_button = 0;
                    self.fake_mask = Modifiers::empty();
                    self.sync_modifiers(real_state & Modifiers::KEYS, sink);
                }
            }
            InputEvent::KeyPress { keycode, time, .. } => {
                self.last_time = time;
                self.press_keycode(keycode, true, sink);
            }
            InputEvent::KeyRelease { keycode, time, .. } => {
                self.last_time = time;
                self.press_keycode(keycode, false, sink);
            }
            InputEvent::ModifiersChanged { time, .. } => self.last_time = time,
            InputEvent::Client(_) => {}
        }
        None
    }

    fn begin_fake_button(&mut self, state: Modifiers) {
        if !self.fake.enabled || self.fake_button != 0 {
            return;
        }
        let (button, mask) = if !self.fake.button2.is_empty() && state.contains(self.fake.button2) {
            (2, self.fake.button2)
        } else if !self.fake.button3.is_empty() && state.contains(self.fake.button3) {
            (3, self.fake.button3)
        } else {
            return;
        };
        debug!("Emulating button {} with {:?}", button, mask);
        self.fake_button = button;
        self.fake_mask = mask;
    }

    fn emulated(&self, button: u8) -> u8 {
        if button == 1 && self.fake_button != 0 {
            self.fake_button
        } else {
            button
        }
    }

    /// State as clients see it: emulating modifiers hidden and button 1
    /// reported as the emulated button
    fn visible_state(&self, state: Modifiers) -> Modifiers {
        let mut state = state - self.fake_mask;
        if self.fake_button != 0 && state.contains(Modifiers::BUTTON1) {
            state.remove(Modifiers::BUTTON1);
            state.insert(if self.fake_button == 2 { Modifiers::BUTTON2 } else { Modifiers::BUTTON3 });
        }
        state
    }

    /// Synthesize modifier key events for the difference between the
    /// tracked flags and `flags`
    fn sync_modifiers(&mut self, flags: Modifiers, sink: &mut dyn InputSink) {
        if flags == self.current_flags {
            return;
        }
        let old = self.current_flags;
        self.current_flags = flags;
        for &(modifier, keycode) in &MODIFIER_KEYS {
            let was = old.contains(modifier);
            let is = flags.contains(modifier);
            if was == is {
                continue;
            }
            if modifier == Modifiers::CAPS_LOCK {
                // A lock toggle is one full press and release
                self.press_keycode(keycode, true, sink);
                self.press_keycode(keycode, false, sink);
            } else {
                self.press_keycode(keycode, is, sink);
            }
        }
    }

    fn press_keycode(&mut self, keycode: u8, pressed: bool, sink: &mut dyn InputSink) {
        if pressed {
            self.keys_down.insert(keycode);
        } else if !self.keys_down.remove(&keycode) {
            trace!("Ignoring release of key {} that is not down", keycode);
            return;
        }
        let protocol = keycode.saturating_add(MIN_KEYCODE);
        sink.key(protocol, pressed, self.current_flags, self.last_time);
    }

    /// Release every non-modifier key still held
    pub fn release_keys(&mut self, sink: &mut dyn InputSink) {
        let held: Vec<u8> = self.keys_down.iter().copied().filter(|k| !is_modifier_key(*k)).collect();
        if !held.is_empty() {
            debug!("Releasing {} held keys", held.len());
        }
        for keycode in held {
            self.press_keycode(keycode, false, sink);
        }
    }
}
