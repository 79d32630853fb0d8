//! Field flag set.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Flags describing how a field may be used.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldFlags(u16);

const NAMES: [(FieldFlags, &str); 8] = [
    (FieldFlags::IS_KEY, "IsKey"),
    (FieldFlags::IS_CONNECTION, "IsConnection"),
    (FieldFlags::IS_ARRAY, "IsArray"),
    (FieldFlags::IS_FILTERABLE, "IsFilterable"),
    (FieldFlags::IS_SORTABLE, "IsSortable"),
    (FieldFlags::CAN_BE_USED_IN_INPUT, "CanBeUsedInInput"),
    (FieldFlags::QUERYABLE, "Queryable"),
    (FieldFlags::IS_TYPE_ARGUMENT, "IsTypeArgument"),
];

impl FieldFlags {
    pub const NONE: FieldFlags = FieldFlags(0);
    /// The field is the object's key. Only scalars can be keys.
    pub const IS_KEY: FieldFlags = FieldFlags(1);
    /// The field is a filterable, sortable, paged collection.
    pub const IS_CONNECTION: FieldFlags = FieldFlags(1 << 1);
    /// The field is a plain list.
    pub const IS_ARRAY: FieldFlags = FieldFlags(1 << 2);
    pub const IS_FILTERABLE: FieldFlags = FieldFlags(1 << 3);
    pub const IS_SORTABLE: FieldFlags = FieldFlags(1 << 4);
    /// The field is part of the type's input shape.
    pub const CAN_BE_USED_IN_INPUT: FieldFlags = FieldFlags(1 << 5);
    /// The field can be requested in queries.
    pub const QUERYABLE: FieldFlags = FieldFlags(1 << 6);
    /// The argument is consumed by the collection machinery itself.
    pub const IS_TYPE_ARGUMENT: FieldFlags = FieldFlags(1 << 7);

    /// Returns true if every flag of `other` is set.
    pub fn contains(self, other: FieldFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any flag of `other` is set.
    pub fn intersects(self, other: FieldFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Sets the given flags.
    pub fn insert(&mut self, other: FieldFlags) {
        self.0 |= other.0;
    }

    /// Clears the given flags.
    pub fn remove(&mut self, other: FieldFlags) {
        self.0 &= !other.0;
    }

    /// Returns a copy without the given flags.
    #[must_use]
    pub fn without(mut self, other: FieldFlags) -> FieldFlags {
        self.remove(other);
        self
    }

    /// Returns only the flags that are also set in `mask`.
    #[must_use]
    pub fn masked(self, mask: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 & mask.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the names of the set flags.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        NAMES
            .iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
    }

    fn from_name(name: &str) -> Option<FieldFlags> {
        NAMES
            .iter()
            .find(|(_, candidate)| *candidate == name)
            .map(|(flag, _)| *flag)
    }
}

impl BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FieldFlags {
    fn bitor_assign(&mut self, rhs: FieldFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let names: Vec<_> = self.names().collect();
        f.write_str(&names.join(" | "))
    }
}

impl Serialize for FieldFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for name in self.names() {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for FieldFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut flags = FieldFlags::NONE;
        for name in names {
            let flag = FieldFlags::from_name(&name)
                .ok_or_else(|| de::Error::custom(format!("unknown field flag `{name}`")))?;
            flags.insert(flag);
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_operations() {
        let mut flags = FieldFlags::QUERYABLE | FieldFlags::IS_FILTERABLE;
        assert!(flags.contains(FieldFlags::QUERYABLE));
        assert!(!flags.contains(FieldFlags::QUERYABLE | FieldFlags::IS_KEY));
        assert!(flags.intersects(FieldFlags::QUERYABLE | FieldFlags::IS_KEY));

        flags.remove(FieldFlags::IS_FILTERABLE);
        assert_eq!(flags, FieldFlags::QUERYABLE);
        assert_eq!(format!("{flags:?}"), "Queryable");
    }

    #[test]
    fn test_flags_serde() {
        let flags = FieldFlags::IS_KEY | FieldFlags::QUERYABLE;
        let json = serde_json::to_value(flags).unwrap();
        assert_eq!(json, serde_json::json!(["IsKey", "Queryable"]));

        let back: FieldFlags = serde_json::from_value(json).unwrap();
        assert_eq!(back, flags);
        assert!(serde_json::from_value::<FieldFlags>(serde_json::json!(["Bogus"])).is_err());
    }
}
