use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Slider-backed adjustments. These persist across preset toggles.
///
/// Declaration order is the serialization order, so descriptors built from
/// the same chain state are always byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Adjustment {
    Brightness,
    Contrast,
    Saturate,
}

impl Adjustment {
    pub const ALL: [Adjustment; 3] = [
        Adjustment::Brightness,
        Adjustment::Contrast,
        Adjustment::Saturate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Adjustment::Brightness => "brightness",
            Adjustment::Contrast => "contrast",
            Adjustment::Saturate => "saturate",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.name() == name)
    }

    /// Value at which the adjustment has no visible effect.
    pub fn neutral(self) -> f32 {
        1.0
    }
}

/// One-click preset effects; at most one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Grayscale,
    Sepia,
    Invert,
    Pop,
    Soften,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Grayscale,
        Preset::Sepia,
        Preset::Invert,
        Preset::Pop,
        Preset::Soften,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Preset::Grayscale => "Grayscale",
            Preset::Sepia => "Sepia",
            Preset::Invert => "Invert",
            Preset::Pop => "Pop",
            Preset::Soften => "Soften",
        }
    }

    /// Descriptor fragment contributed by this preset.
    pub fn fragment(self) -> &'static str {
        match self {
            Preset::Grayscale => "grayscale(1)",
            Preset::Sepia => "sepia(0.8)",
            Preset::Invert => "invert(1)",
            Preset::Pop => "hue-rotate(180deg)",
            Preset::Soften => "blur(2px)",
        }
    }

    fn from_fragment(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.fragment() == token)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),
    #[error("malformed filter token `{0}`")]
    MalformedToken(String),
}

/// Sentinel descriptor for an empty chain.
pub const NONE_DESCRIPTOR: &str = "none";

/// The active set of non-destructive adjustments.
///
/// Structured replacement for a flattened filter string: adjustments live in
/// an ordered map keyed by a closed vocabulary, and the exclusive preset is
/// its own field, so "which preset is active" is a lookup rather than a
/// substring match against fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    values: BTreeMap<Adjustment, f32>,
    preset: Option<Preset>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, adjustment: Adjustment) -> f32 {
        self.values
            .get(&adjustment)
            .copied()
            .unwrap_or(adjustment.neutral())
    }

    pub fn preset(&self) -> Option<Preset> {
        self.preset
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.preset.is_none()
    }

    /// Inserts or overwrites one adjustment, leaving everything else
    /// untouched. Returns the new descriptor.
    pub fn apply_adjustment(&mut self, adjustment: Adjustment, value: f32) -> String {
        self.values.insert(adjustment, value);
        self.descriptor()
    }

    /// Toggles a preset: same preset off, different preset replaces the
    /// active one. Adjustment entries are never disturbed.
    pub fn toggle(&mut self, preset: Preset) -> String {
        self.preset = if self.preset == Some(preset) {
            None
        } else {
            Some(preset)
        };
        self.descriptor()
    }

    /// Clears the preset but keeps the slider adjustments.
    pub fn reset(&mut self) -> String {
        self.preset = None;
        self.descriptor()
    }

    /// Clears everything, returning to the `none` descriptor.
    pub fn clear(&mut self) -> String {
        self.values.clear();
        self.preset = None;
        self.descriptor()
    }

    /// Serializes the chain into a single descriptor string: adjustment
    /// tokens in fixed order, then the preset fragment, or `none`.
    pub fn descriptor(&self) -> String {
        if self.is_empty() {
            return NONE_DESCRIPTOR.to_string();
        }
        let mut out = String::new();
        for (adjustment, value) in &self.values {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{}({:.2})", adjustment.name(), value);
        }
        if let Some(preset) = self.preset {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(preset.fragment());
        }
        out
    }

    /// Parses a descriptor produced by [`FilterChain::descriptor`].
    pub fn parse(descriptor: &str) -> Result<Self, FilterParseError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() || descriptor == NONE_DESCRIPTOR {
            return Ok(Self::default());
        }

        let mut chain = Self::default();
        for token in descriptor.split_whitespace() {
            let (name, rest) = token
                .split_once('(')
                .ok_or_else(|| FilterParseError::MalformedToken(token.to_string()))?;
            let value = rest
                .strip_suffix(')')
                .ok_or_else(|| FilterParseError::MalformedToken(token.to_string()))?;

            if let Some(adjustment) = Adjustment::from_name(name) {
                let value: f32 = value
                    .parse()
                    .map_err(|_| FilterParseError::MalformedToken(token.to_string()))?;
                chain.values.insert(adjustment, value);
            } else if let Some(preset) = Preset::from_fragment(token) {
                chain.preset = Some(preset);
            } else {
                return Err(FilterParseError::UnknownFilter(name.to_string()));
            }
        }
        Ok(chain)
    }
}
