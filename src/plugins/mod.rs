//! Interactive plugins. Each one registers its bindings and hooks against
//! the core in `init`, claims an ownership ticket for grab arbitration, and
//! keeps its own state machine; the event loop routes matched bindings back
//! through the `Plugin` trait by slot and binding id.

mod expo;
mod move_resize;
mod workspace;

pub use expo::Expo;
pub use move_resize::{Move, Resize};
pub use workspace::WorkspaceSwitch;

use crate::bindings::{BindingId, Context, Handler};
use crate::config::Config;
use crate::ownership::OwnershipArbiter;
use crate::wm::Core;
use std::collections::HashMap;

pub trait Plugin {
    fn name(&self) -> &'static str;

    /// Registers the plugin's ownership ticket, if it takes part in grab
    /// arbitration.
    fn register_ownership(&self, _owners: &mut OwnershipArbiter) {}

    /// Registers bindings and hooks. `handle` identifies this plugin's slot
    /// and must be attached to everything it registers.
    fn init(&mut self, core: &mut Core, handle: Handler);

    /// Re-reads option values from configuration. Options a plugin marked
    /// `already_set` keep their current value.
    fn configure(&mut self, _config: &Config) {}

    fn on_key(&mut self, _core: &mut Core, _id: BindingId, _ctx: &Context) {}
    fn on_button(&mut self, _core: &mut Core, _id: BindingId, _ctx: &Context) {}
    fn on_hook(&mut self, _core: &mut Core, _id: BindingId) {}
}

/// A typed configuration value with its default.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// One plugin option: current value, default, and an opt-out flag a plugin
/// sets when it does not want the value re-read on configuration reload.
#[derive(Debug, Clone)]
pub struct PluginOption {
    pub value: OptionValue,
    pub default: OptionValue,
    pub already_set: bool,
}

impl PluginOption {
    fn new(default: OptionValue) -> Self {
        PluginOption {
            value: default.clone(),
            default,
            already_set: false,
        }
    }

    /// Accepts a toml value of the matching type; anything else is refused
    /// so a typo in the file cannot change an option's type.
    fn set_from_toml(&mut self, raw: &toml::Value) -> bool {
        let parsed = match (&self.default, raw) {
            (OptionValue::Bool(_), toml::Value::Boolean(v)) => Some(OptionValue::Bool(*v)),
            (OptionValue::Int(_), toml::Value::Integer(v)) => Some(OptionValue::Int(*v)),
            (OptionValue::Float(_), toml::Value::Float(v)) => Some(OptionValue::Float(*v)),
            (OptionValue::Float(_), toml::Value::Integer(v)) => {
                Some(OptionValue::Float(*v as f64))
            }
            (OptionValue::Str(_), toml::Value::String(v)) => Some(OptionValue::Str(v.clone())),
            _ => None,
        };
        match parsed {
            Some(value) => {
                self.value = value;
                true
            }
            None => false,
        }
    }
}

/// Per-plugin option store keyed by name.
#[derive(Debug, Default)]
pub struct OptionRegistry {
    options: HashMap<String, PluginOption>,
}

impl OptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, key: &str, default: OptionValue) {
        self.options
            .insert(key.to_string(), PluginOption::new(default));
    }

    pub fn get(&self, key: &str) -> Option<&PluginOption> {
        self.options.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PluginOption> {
        self.options.get_mut(key)
    }

    pub fn int(&self, key: &str) -> i64 {
        match self.options.get(key).map(|o| &o.value) {
            Some(OptionValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub fn bool(&self, key: &str) -> bool {
        matches!(
            self.options.get(key).map(|o| &o.value),
            Some(OptionValue::Bool(true))
        )
    }

    /// Applies a configuration table: every option not marked `already_set`
    /// takes the table's value when present and well-typed, and reverts to
    /// its default otherwise.
    pub fn load(&mut self, table: Option<&toml::value::Table>) {
        for (key, option) in self.options.iter_mut() {
            if option.already_set {
                continue;
            }
            let applied = table
                .and_then(|t| t.get(key))
                .map_or(false, |raw| option.set_from_toml(raw));
            if !applied {
                option.value = option.default.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> toml::value::Table {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn load_applies_matching_values() {
        let mut reg = OptionRegistry::new();
        reg.declare("steps", OptionValue::Int(60));
        reg.declare("wrap", OptionValue::Bool(true));

        reg.load(Some(&table("steps = 30\nwrap = false\n")));
        assert_eq!(reg.int("steps"), 30);
        assert!(!reg.bool("wrap"));
    }

    #[test]
    fn missing_or_mistyped_values_revert_to_default() {
        let mut reg = OptionRegistry::new();
        reg.declare("steps", OptionValue::Int(60));

        reg.load(Some(&table("steps = 30\n")));
        assert_eq!(reg.int("steps"), 30);

        /* key absent: back to default */
        reg.load(Some(&table("")));
        assert_eq!(reg.int("steps"), 60);

        /* wrong type: refused */
        reg.load(Some(&table("steps = \"fast\"\n")));
        assert_eq!(reg.int("steps"), 60);
    }

    #[test]
    fn already_set_opts_out_of_reload() {
        let mut reg = OptionRegistry::new();
        reg.declare("steps", OptionValue::Int(60));

        let option = reg.get_mut("steps").unwrap();
        option.value = OptionValue::Int(90);
        option.already_set = true;

        reg.load(Some(&table("steps = 30\n")));
        assert_eq!(reg.int("steps"), 90);
    }
}
