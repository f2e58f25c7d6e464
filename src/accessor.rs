// (c) Copyright 2026 The changeset authors. All rights reserved.
/// Read-only views a buffer exposes by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Accessor {
    Change,
    Changes,
    Error,
    Errors,
    Data,
    PendingData,
    IsValid,
    IsInvalid,
    IsDirty,
    IsPristine,
    IsValidating,
}

const NAMES: [(&str, Accessor); 11] = [
    ("change", Accessor::Change),
    ("changes", Accessor::Changes),
    ("error", Accessor::Error),
    ("errors", Accessor::Errors),
    ("data", Accessor::Data),
    ("pendingData", Accessor::PendingData),
    ("isValid", Accessor::IsValid),
    ("isInvalid", Accessor::IsInvalid),
    ("isDirty", Accessor::IsDirty),
    ("isPristine", Accessor::IsPristine),
    ("isValidating", Accessor::IsValidating),
];

impl Accessor {
    pub(crate) fn parse(key: &str) -> Option<Accessor> {
        NAMES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, accessor)| *accessor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_exact() {
        assert_eq!(Accessor::parse("isValid"), Some(Accessor::IsValid));
        assert_eq!(Accessor::parse("pendingData"), Some(Accessor::PendingData));
        assert_eq!(Accessor::parse("isvalid"), None);
        assert_eq!(Accessor::parse("changes.name"), None);
    }
}
