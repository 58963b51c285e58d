//! The in-memory configuration store and its public API.

use std::collections::HashMap;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::ConfigError;
use crate::interpolate::{self, Interpolation, Layer};
use crate::reader;

/// Name of the distinguished fallback section. Options stored here are
/// visible from every other section with the lowest lookup priority.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Reserved key resolving to the current section's name during
/// interpolation. Never stored, enumerated, or serialized.
pub(crate) const NAME_MARKER: &str = "__name__";

fn lowercase(name: &str) -> String {
    name.to_lowercase()
}

/// A sectioned configuration store with DEFAULT fallback and deferred
/// `%(name)s` interpolation.
///
/// Sections map normalized option names to raw string values; values are
/// expanded on every read against a transient priority chain (per-call
/// overrides, then the section, then DEFAULT) and never converted or
/// rewritten in place. Later sources override earlier ones key by key.
///
/// ## Example
///
/// ```
/// use iniconf::Config;
///
/// let mut config = Config::new();
/// config.read_str("[DEFAULT]\nroot = /srv\n\n[paths]\ndata = %(root)s/data\n")?;
/// assert_eq!(config.get("paths", "data")?, "/srv/data");
/// # Ok::<(), iniconf::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) defaults: IndexMap<String, String>,
    pub(crate) sections: IndexMap<String, IndexMap<String, String>>,
    pub(crate) normalize: fn(&str) -> String,
    interpolation: Interpolation,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Creates an empty store with lowercase normalization and the greedy
    /// interpolation strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Adds an empty section.
    ///
    /// Fails with [`ConfigError::DuplicateSection`] if the section already
    /// exists; the DEFAULT name is always considered present.
    pub fn add_section(&mut self, name: &str) -> Result<(), ConfigError> {
        if name == DEFAULT_SECTION || self.sections.contains_key(name) {
            return Err(ConfigError::DuplicateSection(name.to_string()));
        }
        self.sections.insert(name.to_string(), IndexMap::new());
        Ok(())
    }

    /// Whether the named section exists. DEFAULT is not acknowledged.
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Section names in store order, never including DEFAULT.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Whether the option exists in the section or in DEFAULT.
    ///
    /// An unknown section yields `false` rather than an error; an empty or
    /// DEFAULT section name checks the DEFAULT mapping only.
    pub fn has_option(&self, section: &str, option: &str) -> bool {
        let key = (self.normalize)(option);
        if section.is_empty() || section == DEFAULT_SECTION {
            return self.defaults.contains_key(&key);
        }
        match self.sections.get(section) {
            Some(map) => map.contains_key(&key) || self.defaults.contains_key(&key),
            None => false,
        }
    }

    /// Option names visible from the section: its own entries in store
    /// order, then DEFAULT entries it does not shadow.
    pub fn options(&self, section: &str) -> Result<Vec<String>, ConfigError> {
        let sect = self.section_map(section)?;
        let mut names: Vec<String> = Vec::new();
        if let Some(map) = sect {
            names.extend(map.keys().cloned());
        }
        for key in self.defaults.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
        Ok(names)
    }

    /// The DEFAULT mapping in store order.
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defaults.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Looks up an option and expands it with the configured strategy.
    ///
    /// Resolution consults the section first and falls back to DEFAULT.
    /// Fails with [`ConfigError::NoSection`] if the section is absent
    /// (DEFAULT always resolves) and [`ConfigError::NoOption`] if the
    /// normalized key is missing from both layers.
    pub fn get(&self, section: &str, option: &str) -> Result<String, ConfigError> {
        self.resolve(section, option, None, self.interpolation)
    }

    /// Like [`get`](Self::get), with caller-supplied overrides taking
    /// priority over both the section and DEFAULT. Override keys pass
    /// through the same normalization as stored options.
    pub fn get_with(
        &self,
        section: &str,
        option: &str,
        overrides: &HashMap<String, String>,
    ) -> Result<String, ConfigError> {
        let vars = self.normalized_overrides(overrides);
        self.resolve(section, option, Some(&vars), self.interpolation)
    }

    /// Like [`get`](Self::get), but returns the stored value verbatim with
    /// no interpolation.
    pub fn get_raw(&self, section: &str, option: &str) -> Result<String, ConfigError> {
        self.resolve(section, option, None, Interpolation::None)
    }

    /// [`get`](Self::get) followed by an integer conversion.
    pub fn get_int(&self, section: &str, option: &str) -> Result<i64, ConfigError> {
        let value = self.get(section, option)?;
        value
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidInt { value, source: e })
    }

    /// [`get`](Self::get) followed by a float conversion.
    pub fn get_float(&self, section: &str, option: &str) -> Result<f64, ConfigError> {
        let value = self.get(section, option)?;
        value
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidFloat { value, source: e })
    }

    /// [`get`](Self::get) followed by a boolean conversion.
    ///
    /// Recognizes `1`/`yes`/`true`/`on` and `0`/`no`/`false`/`off`,
    /// case-insensitively; anything else is [`ConfigError::NotABoolean`].
    pub fn get_bool(&self, section: &str, option: &str) -> Result<bool, ConfigError> {
        let value = self.get(section, option)?;
        match value.to_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Ok(true),
            "0" | "no" | "false" | "off" => Ok(false),
            _ => Err(ConfigError::NotABoolean(value)),
        }
    }

    /// Interpolated `(key, value)` pairs for everything visible from the
    /// section: DEFAULT entries first, then the section's own additions.
    pub fn items(&self, section: &str) -> Result<Vec<(String, String)>, ConfigError> {
        self.items_inner(section, None)
    }

    /// Like [`items`](Self::items), with caller-supplied overrides layered
    /// on top.
    pub fn items_with(
        &self,
        section: &str,
        overrides: &HashMap<String, String>,
    ) -> Result<Vec<(String, String)>, ConfigError> {
        let vars = self.normalized_overrides(overrides);
        self.items_inner(section, Some(&vars))
    }

    /// Sets an option, overwriting any previous value.
    ///
    /// An empty or DEFAULT section name targets the DEFAULT mapping; any
    /// other absent section fails with [`ConfigError::NoSection`].
    pub fn set(
        &mut self,
        section: &str,
        option: &str,
        value: impl Into<String>,
    ) -> Result<(), ConfigError> {
        let key = (self.normalize)(option);
        let map = self.section_map_mut(section)?;
        map.insert(key, value.into());
        Ok(())
    }

    /// [`set`](Self::set) for any value with a string form, stringified at
    /// write time.
    pub fn set_display(
        &mut self,
        section: &str,
        option: &str,
        value: impl Display,
    ) -> Result<(), ConfigError> {
        self.set(section, option, value.to_string())
    }

    /// Removes an option, reporting whether it existed. Fails with
    /// [`ConfigError::NoSection`] if the section itself is absent.
    pub fn remove_option(&mut self, section: &str, option: &str) -> Result<bool, ConfigError> {
        let key = (self.normalize)(option);
        let map = self.section_map_mut(section)?;
        Ok(map.shift_remove(&key).is_some())
    }

    /// Removes a section and all its options, reporting whether it existed.
    pub fn remove_section(&mut self, name: &str) -> bool {
        self.sections.shift_remove(name).is_some()
    }

    /// Serializes the store: DEFAULT first when non-empty, then each section
    /// in store order as a `[NAME]` header, `key = value` lines (embedded
    /// newlines re-indented with one tab), and a trailing blank line.
    ///
    /// Sink failures surface as [`ConfigError::Write`].
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<(), ConfigError> {
        self.write_inner(sink)
            .map_err(|e| ConfigError::Write { source: e })
    }

    fn write_inner<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        if !self.defaults.is_empty() {
            write_section(sink, DEFAULT_SECTION, &self.defaults)?;
        }
        for (name, options) in &self.sections {
            write_section(sink, name, options)?;
        }
        Ok(())
    }

    /// Reads and parses each path in order, later sources overriding earlier
    /// ones key by key.
    ///
    /// Sources that cannot be opened are silently skipped so callers can
    /// list candidate locations without probing first. Returns the paths
    /// actually processed; parse failures propagate immediately.
    pub fn read<I, P>(&mut self, paths: I) -> Result<Vec<PathBuf>, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut processed = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let Ok(file) = File::open(path) else { continue };
            reader::parse(self, BufReader::new(file), &path.display().to_string())?;
            processed.push(path.to_path_buf());
        }
        Ok(processed)
    }

    /// Parses one already-open source; `name` is used in error messages.
    pub fn read_from<R: BufRead>(&mut self, source: R, name: &str) -> Result<(), ConfigError> {
        reader::parse(self, source, name)
    }

    /// Parses configuration text directly.
    pub fn read_str(&mut self, text: &str) -> Result<(), ConfigError> {
        self.read_from(text.as_bytes(), "<string>")
    }

    fn resolve(
        &self,
        section: &str,
        option: &str,
        overrides: Option<&HashMap<String, String>>,
        strategy: Interpolation,
    ) -> Result<String, ConfigError> {
        let layer = Layer {
            overrides,
            section: self.section_map(section)?,
            section_name: section,
            defaults: &self.defaults,
        };
        let key = (self.normalize)(option);
        let raw = layer.lookup(&key).ok_or_else(|| ConfigError::NoOption {
            section: section.to_string(),
            option: option.to_string(),
        })?;
        interpolate::interpolate(strategy, &layer, section, option, raw, self.normalize)
    }

    fn items_inner(
        &self,
        section: &str,
        overrides: Option<&HashMap<String, String>>,
    ) -> Result<Vec<(String, String)>, ConfigError> {
        let sect = self.section_map(section)?;
        let layer = Layer {
            overrides,
            section: sect,
            section_name: section,
            defaults: &self.defaults,
        };

        let mut keys: Vec<&str> = self.defaults.keys().map(String::as_str).collect();
        if let Some(map) = sect {
            for key in map.keys() {
                if !keys.contains(&key.as_str()) {
                    keys.push(key.as_str());
                }
            }
        }
        if let Some(vars) = overrides {
            for key in vars.keys() {
                if !keys.contains(&key.as_str()) {
                    keys.push(key.as_str());
                }
            }
        }

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            // Merged keys all came from one of the layers.
            let raw = layer.lookup(key).expect("key drawn from the layer");
            let value = interpolate::interpolate(
                self.interpolation,
                &layer,
                section,
                key,
                raw,
                self.normalize,
            )?;
            out.push((key.to_string(), value));
        }
        Ok(out)
    }

    /// `None` stands for the DEFAULT mapping, which always resolves.
    fn section_map(&self, section: &str) -> Result<Option<&IndexMap<String, String>>, ConfigError> {
        if section.is_empty() || section == DEFAULT_SECTION {
            return Ok(None);
        }
        self.sections
            .get(section)
            .map(Some)
            .ok_or_else(|| ConfigError::NoSection(section.to_string()))
    }

    fn section_map_mut(
        &mut self,
        section: &str,
    ) -> Result<&mut IndexMap<String, String>, ConfigError> {
        if section.is_empty() || section == DEFAULT_SECTION {
            return Ok(&mut self.defaults);
        }
        self.sections
            .get_mut(section)
            .ok_or_else(|| ConfigError::NoSection(section.to_string()))
    }

    fn normalized_overrides(&self, overrides: &HashMap<String, String>) -> HashMap<String, String> {
        overrides
            .iter()
            .map(|(k, v)| ((self.normalize)(k), v.clone()))
            .collect()
    }
}

fn write_section<W: Write>(
    sink: &mut W,
    name: &str,
    options: &IndexMap<String, String>,
) -> io::Result<()> {
    writeln!(sink, "[{name}]")?;
    for (key, value) in options {
        writeln!(sink, "{key} = {}", value.replace('\n', "\n\t"))?;
    }
    writeln!(sink)
}

/// Builder for a [`Config`] store.
///
/// Selects the intrinsic defaults, the option-name normalization function,
/// and the interpolation strategy; none of these can change after
/// construction.
///
/// ## Example
///
/// ```
/// use iniconf::{Config, Interpolation};
///
/// let mut config = Config::builder()
///     .default_value("dir", "/tmp")
///     .interpolation(Interpolation::Recursive)
///     .build();
/// config.add_section("cache")?;
/// config.set("cache", "path", "%(dir)s/cache")?;
/// assert_eq!(config.get("cache", "path")?, "/tmp/cache");
/// # Ok::<(), iniconf::ConfigError>(())
/// ```
#[derive(Debug)]
#[must_use = "builders do nothing until .build() is called"]
pub struct ConfigBuilder {
    defaults: Vec<(String, String)>,
    normalize: fn(&str) -> String,
    interpolation: Interpolation,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            defaults: Vec::new(),
            normalize: lowercase,
            interpolation: Interpolation::default(),
        }
    }
}

impl ConfigBuilder {
    /// Seeds one intrinsic DEFAULT entry.
    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    /// Seeds intrinsic DEFAULT entries from an iterator of pairs.
    pub fn defaults<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.defaults
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Replaces the option-name normalization function (default: lowercase).
    /// Applied to every option name before storage and lookup.
    pub fn normalizer(mut self, normalize: fn(&str) -> String) -> Self {
        self.normalize = normalize;
        self
    }

    /// Selects the interpolation strategy (default: greedy).
    pub fn interpolation(mut self, strategy: Interpolation) -> Self {
        self.interpolation = strategy;
        self
    }

    /// Builds the store, normalizing the seeded default keys.
    pub fn build(self) -> Config {
        let normalize = self.normalize;
        Config {
            defaults: self
                .defaults
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .collect(),
            sections: IndexMap::new(),
            normalize,
            interpolation: self.interpolation,
        }
    }
}
