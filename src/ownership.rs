use crate::display::DisplayServer;
use std::collections::{HashMap, HashSet};

/// A plugin's identity token. Interactive plugins activate their ticket
/// before touching the pointer so that mutually incompatible operations
/// cannot overlap.
#[derive(Debug, Clone)]
pub struct Ownership {
    pub name: String,
    /// Peers this plugin tolerates running alongside.
    pub compat: HashSet<String>,
    pub compat_all: bool,
    /// Bypasses compatibility checks entirely.
    pub special: bool,
    pub active: bool,
    pub grabbed: bool,
}

impl Ownership {
    pub fn new(name: impl Into<String>) -> Self {
        Ownership {
            name: name.into(),
            compat: HashSet::new(),
            compat_all: false,
            special: false,
            active: false,
            grabbed: false,
        }
    }

    pub fn compat_all(mut self) -> Self {
        self.compat_all = true;
        self
    }

    pub fn compatible_with(mut self, peer: &str) -> Self {
        self.compat.insert(peer.to_string());
        self
    }

    pub fn special(mut self) -> Self {
        self.special = true;
        self
    }
}

/// Enforces the at-most-one-active policy across interactive plugins and
/// tracks which ticket holds the pointer grab. The arbiter never preempts: a
/// losing activation simply returns false.
#[derive(Default)]
pub struct OwnershipArbiter {
    owners: HashMap<String, Ownership>,
}

impl OwnershipArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner: Ownership) {
        self.owners.insert(owner.name.clone(), owner);
    }

    pub fn get(&self, name: &str) -> Option<&Ownership> {
        self.owners.get(name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.owners.get(name).map_or(false, |o| o.active)
    }

    /// Grants activation iff the candidate is pairwise compatible with every
    /// currently active ticket. Re-activating an active ticket is a no-op.
    pub fn activate(&mut self, name: &str) -> bool {
        let candidate = match self.owners.get(name) {
            Some(o) => o,
            None => return false,
        };
        if candidate.active {
            return true;
        }

        let ok = self
            .owners
            .values()
            .filter(|u| u.active && u.name != name)
            .all(|u| compatible(candidate, u));

        if ok {
            self.owners.get_mut(name).unwrap().active = true;
        } else {
            trace!("activation denied for {}", name);
        }
        ok
    }

    /// Clears the ticket, releasing its pointer grab if still held.
    pub fn deactivate(&mut self, name: &str, display: &mut dyn DisplayServer) {
        if let Some(owner) = self.owners.get_mut(name) {
            if owner.grabbed {
                display.ungrab_pointer();
                owner.grabbed = false;
            }
            owner.active = false;
        }
    }

    /// Diverts pointer input to the holder of an active ticket.
    pub fn grab(&mut self, name: &str, display: &mut dyn DisplayServer) {
        if let Some(owner) = self.owners.get_mut(name) {
            if owner.active && !owner.grabbed {
                display.grab_pointer();
                owner.grabbed = true;
            }
        }
    }

    pub fn ungrab(&mut self, name: &str, display: &mut dyn DisplayServer) {
        if let Some(owner) = self.owners.get_mut(name) {
            if owner.grabbed {
                display.ungrab_pointer();
                owner.grabbed = false;
            }
        }
    }
}

fn compatible(t: &Ownership, u: &Ownership) -> bool {
    if t.special || u.special {
        return true;
    }
    (t.compat_all || t.compat.contains(&u.name)) && (u.compat_all || u.compat.contains(&t.name))
}
