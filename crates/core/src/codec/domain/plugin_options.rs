use std::sync::Arc;

use thiserror::Error;

/// Called with `(plugin, option)` after an option value changed.
pub type OptionListener = Arc<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    #[error("{plugin}: unknown option \"{option}\"")]
    Unknown { plugin: &'static str, option: String },
    #[error("{plugin}: invalid value \"{value}\" for option \"{option}\" (expected {expected})")]
    InvalidValue {
        plugin: &'static str,
        option: String,
        value: String,
        expected: String,
    },
}

/// A plugin's typed option struct, addressed through string names.
pub trait OptionValues: Clone + PartialEq + Send + Sync + 'static {
    const NAMES: &'static [&'static str];

    /// Current value of a canonical option name, rendered as text.
    fn get(&self, name: &str) -> Option<String>;

    /// Valid values for enumerated options. Free-form options return an
    /// empty list.
    fn domain(name: &str) -> Vec<String>;

    /// Parses and stores `value`. On failure returns a description of what
    /// was expected and leaves `self` unchanged.
    fn set(&mut self, name: &str, value: &str) -> Result<(), String>;
}

/// String-keyed option access with case-insensitive names and change
/// notification.
pub struct PluginOptions<O: OptionValues> {
    plugin: &'static str,
    values: O,
    listener: Option<OptionListener>,
}

impl<O: OptionValues> PluginOptions<O> {
    pub fn new(plugin: &'static str, values: O) -> Self {
        Self {
            plugin,
            values,
            listener: None,
        }
    }

    pub fn values(&self) -> &O {
        &self.values
    }

    pub fn names(&self) -> Vec<&'static str> {
        O::NAMES.to_vec()
    }

    fn canonical(name: &str) -> Option<&'static str> {
        O::NAMES.iter().copied().find(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<String> {
        Self::canonical(name).and_then(|n| self.values.get(n))
    }

    pub fn domain(&self, name: &str) -> Option<Vec<String>> {
        Self::canonical(name).map(O::domain)
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<bool, OptionError> {
        let Some(canonical) = Self::canonical(name) else {
            return Err(OptionError::Unknown {
                plugin: self.plugin,
                option: name.to_string(),
            });
        };
        let mut next = self.values.clone();
        next.set(canonical, value).map_err(|expected| OptionError::InvalidValue {
            plugin: self.plugin,
            option: canonical.to_string(),
            value: value.to_string(),
            expected,
        })?;
        if next == self.values {
            return Ok(false);
        }
        self.values = next;
        log::debug!("{}: option {canonical} = {value}", self.plugin);
        if let Some(listener) = &self.listener {
            listener(self.plugin, canonical);
        }
        Ok(true)
    }

    pub fn set_listener(&mut self, listener: OptionListener) {
        self.listener = Some(listener);
    }
}

/// Case-insensitive lookup of `value` among named choices.
pub fn parse_choice<T: Copy>(value: &str, choices: &[(&str, T)]) -> Option<T> {
    choices
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value.trim()))
        .map(|&(_, choice)| choice)
}

/// Display names of `choices`, in order.
pub fn choice_names<T>(choices: &[(&str, T)]) -> Vec<String> {
    choices.iter().map(|(name, _)| name.to_string()).collect()
}

/// Name of `value` among `choices`.
pub fn choice_name<T: PartialEq>(value: &T, choices: &[(&str, T)]) -> String {
    choices
        .iter()
        .find(|(_, choice)| choice == value)
        .map(|(name, _)| name.to_string())
        .unwrap_or_default()
}
