//! Feature matrix: a bitset of permitted target-runtime idioms.
//!
//! Callers pass a *disabled* mask; `FeatureSet::enabled()` computes
//! `ALL & !disabled`. Every emission choice with an older-syntax fallback
//! consults this matrix, and the parser rejects values whose faithful
//! emission needs a feature the mask forbids.

use std::ops::{BitAnd, BitOr, Not};

/// One permitted idiom of the target runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Feature {
    AggregateError = 1 << 0,
    ArrayPrototypeValues = 1 << 1,
    ArrowFunction = 1 << 2,
    BigInt = 1 << 3,
    BigIntTypedArray = 1 << 4,
    ErrorPrototypeStack = 1 << 5,
    Map = 1 << 6,
    MethodShorthand = 1 << 7,
    ObjectAssign = 1 << 8,
    Promise = 1 << 9,
    Set = 1 << 10,
    Symbol = 1 << 11,
    TypedArray = 1 << 12,
    WebApi = 1 << 13,
}

impl Feature {
    pub const fn name(self) -> &'static str {
        match self {
            Feature::AggregateError => "AggregateError",
            Feature::ArrayPrototypeValues => "ArrayPrototypeValues",
            Feature::ArrowFunction => "ArrowFunction",
            Feature::BigInt => "BigInt",
            Feature::BigIntTypedArray => "BigIntTypedArray",
            Feature::ErrorPrototypeStack => "ErrorPrototypeStack",
            Feature::Map => "Map",
            Feature::MethodShorthand => "MethodShorthand",
            Feature::ObjectAssign => "ObjectAssign",
            Feature::Promise => "Promise",
            Feature::Set => "Set",
            Feature::Symbol => "Symbol",
            Feature::TypedArray => "TypedArray",
            Feature::WebApi => "WebApi",
        }
    }

    const ALL_VARIANTS: [Feature; 14] = [
        Feature::AggregateError,
        Feature::ArrayPrototypeValues,
        Feature::ArrowFunction,
        Feature::BigInt,
        Feature::BigIntTypedArray,
        Feature::ErrorPrototypeStack,
        Feature::Map,
        Feature::MethodShorthand,
        Feature::ObjectAssign,
        Feature::Promise,
        Feature::Set,
        Feature::Symbol,
        Feature::TypedArray,
        Feature::WebApi,
    ];
}

/// A bitset of `Feature`s. `FeatureSet::all()` is every idiom this crate
/// knows how to emit; `FeatureSet::disabled(mask)` computes the enabled set
/// as `ALL & !mask`, matching the source's `disabledFeatures` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSet(u32);

impl FeatureSet {
    pub const fn empty() -> Self {
        FeatureSet(0)
    }

    pub fn all() -> Self {
        Feature::ALL_VARIANTS
            .iter()
            .fold(FeatureSet::empty(), |acc, f| acc | *f)
    }

    /// Build the enabled set from a mask of *disabled* features, mirroring
    /// the source's caller-facing `disabledFeatures` option.
    pub fn disabled(mask: FeatureSet) -> Self {
        FeatureSet::all() & !mask
    }

    pub fn has(self, feature: Feature) -> bool {
        self.0 & (feature as u32) != 0
    }

    pub fn with(self, feature: Feature) -> Self {
        self | feature
    }
}

impl Default for FeatureSet {
    /// All features enabled — the permissive default when no mask is given.
    fn default() -> Self {
        FeatureSet::all()
    }
}

impl From<Feature> for FeatureSet {
    fn from(f: Feature) -> Self {
        FeatureSet(f as u32)
    }
}

impl BitOr for FeatureSet {
    type Output = FeatureSet;
    fn bitor(self, rhs: FeatureSet) -> FeatureSet {
        FeatureSet(self.0 | rhs.0)
    }
}

impl BitOr<Feature> for FeatureSet {
    type Output = FeatureSet;
    fn bitor(self, rhs: Feature) -> FeatureSet {
        FeatureSet(self.0 | rhs as u32)
    }
}

impl BitAnd for FeatureSet {
    type Output = FeatureSet;
    fn bitand(self, rhs: FeatureSet) -> FeatureSet {
        FeatureSet(self.0 & rhs.0)
    }
}

impl Not for FeatureSet {
    type Output = FeatureSet;
    fn not(self) -> FeatureSet {
        FeatureSet(!self.0)
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        iter.into_iter().fold(FeatureSet::empty(), |acc, f| acc | f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_includes_every_feature() {
        let all = FeatureSet::all();
        for f in Feature::ALL_VARIANTS {
            assert!(all.has(f), "{:?} missing from all()", f.name());
        }
    }

    #[test]
    fn disabled_mask_excludes_only_named_features() {
        let mask = FeatureSet::from(Feature::ObjectAssign) | Feature::ArrowFunction;
        let enabled = FeatureSet::disabled(mask);
        assert!(!enabled.has(Feature::ObjectAssign));
        assert!(!enabled.has(Feature::ArrowFunction));
        assert!(enabled.has(Feature::Map));
        assert!(enabled.has(Feature::Promise));
    }

    #[test]
    fn empty_mask_enables_everything() {
        let enabled = FeatureSet::disabled(FeatureSet::empty());
        assert_eq!(enabled, FeatureSet::all());
    }

    #[test]
    fn default_is_all() {
        assert_eq!(FeatureSet::default(), FeatureSet::all());
    }
}
