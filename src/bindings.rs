use crate::display::{Event, ANY_MODIFIER};
use std::collections::HashMap;

pub type BindingId = u32;

/// Dispatch target of a binding: either the manager itself or one of the
/// plugins, addressed by its slot. Bindings are plain data; routing through a
/// tag keeps callbacks free to mutate the registry they were found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Core,
    Plugin(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Press,
    Release,
}

#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub active: bool,
    pub key: u32,
    pub mods: u32,
    pub handler: Handler,
    /// Whether registration installed a server-side grab; removal issues the
    /// matching ungrab.
    pub grabbed: bool,
}

#[derive(Debug, Clone)]
pub struct ButtonBinding {
    pub active: bool,
    pub kind: ButtonKind,
    pub button: u32,
    pub mods: u32,
    pub handler: Handler,
    pub grabbed: bool,
}

/// A per-frame action, invoked once per tick while active.
#[derive(Debug, Clone)]
pub struct Hook {
    pub active: bool,
    pub handler: Handler,
}

/// Event context handed to key and button actions.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub event: Event,
}

/// Holds key, button and hook registrations keyed by stable integer ids.
/// Ids are the smallest non-negative integer free within their kind, so they
/// are reused after removal.
#[derive(Default)]
pub struct BindingRegistry {
    keys: HashMap<BindingId, KeyBinding>,
    buttons: HashMap<BindingId, ButtonBinding>,
    hooks: HashMap<BindingId, Hook>,
}

fn free_id<T>(map: &HashMap<BindingId, T>) -> BindingId {
    (0..).find(|id| !map.contains_key(id)).unwrap()
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&mut self, binding: KeyBinding) -> BindingId {
        let id = free_id(&self.keys);
        self.keys.insert(id, binding);
        id
    }

    pub fn remove_key(&mut self, id: BindingId) -> Option<KeyBinding> {
        self.keys.remove(&id)
    }

    pub fn add_button(&mut self, binding: ButtonBinding) -> BindingId {
        let id = free_id(&self.buttons);
        self.buttons.insert(id, binding);
        id
    }

    pub fn remove_button(&mut self, id: BindingId) -> Option<ButtonBinding> {
        self.buttons.remove(&id)
    }

    pub fn add_hook(&mut self, hook: Hook) -> BindingId {
        let id = free_id(&self.hooks);
        self.hooks.insert(id, hook);
        id
    }

    pub fn remove_hook(&mut self, id: BindingId) -> Option<Hook> {
        self.hooks.remove(&id)
    }

    pub fn key(&self, id: BindingId) -> Option<&KeyBinding> {
        self.keys.get(&id)
    }

    pub fn button(&self, id: BindingId) -> Option<&ButtonBinding> {
        self.buttons.get(&id)
    }

    pub fn key_active(&self, id: BindingId) -> bool {
        self.keys.get(&id).map_or(false, |k| k.active)
    }

    pub fn button_active(&self, id: BindingId) -> bool {
        self.buttons.get(&id).map_or(false, |b| b.active)
    }

    pub fn hook_active(&self, id: BindingId) -> bool {
        self.hooks.get(&id).map_or(false, |h| h.active)
    }

    pub fn set_key_active(&mut self, id: BindingId, active: bool) {
        if let Some(binding) = self.keys.get_mut(&id) {
            binding.active = active;
        }
    }

    pub fn set_button_active(&mut self, id: BindingId, active: bool) {
        if let Some(binding) = self.buttons.get_mut(&id) {
            binding.active = active;
        }
    }

    pub fn set_hook_active(&mut self, id: BindingId, active: bool) {
        if let Some(hook) = self.hooks.get_mut(&id) {
            hook.active = active;
        }
    }

    /// Key dispatch requires exact modifier-state equality.
    pub fn matching_keys(&self, key: u32, mods: u32) -> Vec<(Handler, BindingId)> {
        self.keys
            .iter()
            .filter(|(_, kb)| kb.active && kb.key == key && kb.mods == mods)
            .map(|(id, kb)| (kb.handler, *id))
            .collect()
    }

    /// Press dispatch matches on any shared modifier bit; the any-modifier
    /// constant is a wildcard.
    pub fn matching_presses(&self, button: u32, mods: u32) -> Vec<(Handler, BindingId)> {
        self.buttons
            .iter()
            .filter(|(_, bb)| {
                bb.active
                    && bb.kind == ButtonKind::Press
                    && bb.button == button
                    && (bb.mods == ANY_MODIFIER || bb.mods & mods != 0)
            })
            .map(|(id, bb)| (bb.handler, *id))
            .collect()
    }

    /// A release fires every active release binding regardless of state.
    pub fn active_releases(&self) -> Vec<(Handler, BindingId)> {
        self.buttons
            .iter()
            .filter(|(_, bb)| bb.active && bb.kind == ButtonKind::Release)
            .map(|(id, bb)| (bb.handler, *id))
            .collect()
    }

    pub fn active_hooks(&self) -> Vec<(Handler, BindingId)> {
        self.hooks
            .iter()
            .filter(|(_, h)| h.active)
            .map(|(id, h)| (h.handler, *id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(keycode: u32, mods: u32) -> KeyBinding {
        KeyBinding {
            active: true,
            key: keycode,
            mods,
            handler: Handler::Core,
            grabbed: false,
        }
    }

    fn button(kind: ButtonKind, btn: u32, mods: u32, active: bool) -> ButtonBinding {
        ButtonBinding {
            active,
            kind,
            button: btn,
            mods,
            handler: Handler::Core,
            grabbed: false,
        }
    }

    #[test]
    fn ids_are_unique_and_smallest_free() {
        let mut reg = BindingRegistry::new();
        assert_eq!(reg.add_key(key(10, 0)), 0);
        assert_eq!(reg.add_key(key(11, 0)), 1);
        assert_eq!(reg.add_key(key(12, 0)), 2);

        reg.remove_key(1);
        assert_eq!(reg.add_key(key(13, 0)), 1);
        assert_eq!(reg.add_key(key(14, 0)), 3);

        /* kinds allocate independently */
        assert_eq!(reg.add_hook(Hook { active: false, handler: Handler::Core }), 0);
    }

    #[test]
    fn key_match_is_exact_on_modifiers() {
        let mut reg = BindingRegistry::new();
        let id = reg.add_key(key(38, 0x8 /* Mod1 */));

        assert_eq!(reg.matching_keys(38, 0x8), vec![(Handler::Core, id)]);
        assert!(reg.matching_keys(38, 0x8 | 0x4).is_empty());
        assert!(reg.matching_keys(38, 0).is_empty());
        assert!(reg.matching_keys(39, 0x8).is_empty());
    }

    #[test]
    fn inactive_key_is_not_dispatched() {
        let mut reg = BindingRegistry::new();
        let id = reg.add_key(key(38, 0));
        reg.set_key_active(id, false);
        assert!(reg.matching_keys(38, 0).is_empty());
    }

    #[test]
    fn press_match_is_any_of_on_modifiers() {
        let mut reg = BindingRegistry::new();
        let id = reg.add_button(button(ButtonKind::Press, 1, 0x8 | 0x4, true));

        assert_eq!(reg.matching_presses(1, 0x8), vec![(Handler::Core, id)]);
        assert_eq!(reg.matching_presses(1, 0x4 | 0x1), vec![(Handler::Core, id)]);
        assert!(reg.matching_presses(1, 0x1).is_empty());
        assert!(reg.matching_presses(2, 0x8).is_empty());
    }

    #[test]
    fn any_modifier_press_is_a_wildcard() {
        let mut reg = BindingRegistry::new();
        let id = reg.add_button(button(ButtonKind::Press, 1, ANY_MODIFIER, true));
        assert_eq!(reg.matching_presses(1, 0), vec![(Handler::Core, id)]);
        assert_eq!(reg.matching_presses(1, 0x8), vec![(Handler::Core, id)]);
    }

    #[test]
    fn release_matches_any_modifier_state() {
        let mut reg = BindingRegistry::new();
        let on = reg.add_button(button(ButtonKind::Release, 1, ANY_MODIFIER, true));
        let _off = reg.add_button(button(ButtonKind::Release, 1, ANY_MODIFIER, false));
        let _press = reg.add_button(button(ButtonKind::Press, 1, 0x8, true));

        assert_eq!(reg.active_releases(), vec![(Handler::Core, on)]);
    }
}
