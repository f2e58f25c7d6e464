// (c) Copyright 2026 The changeset authors. All rights reserved.
use crate::{
    BufferKind,
    deep::{DefaultPolicy, MergePolicy},
};
use serde::Deserialize;
use std::{fmt, rc::Rc};

/// Construction options shared by both buffer strategies.
///
/// Everything but the merge policy can be read from configuration:
///
/// ```rust
/// # use changeset::{BufferKind, Options};
/// let options: Options = serde_json::from_str(
///     r#"{"skipValidate": true, "backend": "nodeTree", "allowedKeys": ["name"]}"#,
/// )
/// .unwrap();
/// assert!(options.skip_validate);
/// assert_eq!(options.backend, BufferKind::NodeTree);
/// ```
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Stage writes without running validators.
    pub skip_validate: bool,
    /// Strategy built by [`buffer`](crate::buffer).
    pub backend: BufferKind,
    /// Top-level keys a node tree accepts writes to. `None` accepts every key.
    pub allowed_keys: Option<Vec<String>>,
    /// Decides how staged changes are merged into content on execute.
    #[serde(skip)]
    pub merge_policy: Option<Rc<dyn MergePolicy>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip_validate(mut self, skip: bool) -> Self {
        self.skip_validate = skip;
        self
    }

    pub fn with_backend(mut self, backend: BufferKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_allowed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_merge_policy(mut self, policy: impl MergePolicy + 'static) -> Self {
        self.merge_policy = Some(Rc::new(policy));
        self
    }

    pub(crate) fn policy(&self) -> &dyn MergePolicy {
        self.merge_policy.as_deref().unwrap_or(&DefaultPolicy)
    }

    /// Returns `true` if a top-level `key` may be written.
    pub(crate) fn allows(&self, key: &str) -> bool {
        self.allowed_keys
            .as_ref()
            .is_none_or(|keys| keys.iter().any(|k| k == key))
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("skip_validate", &self.skip_validate)
            .field("backend", &self.backend)
            .field("allowed_keys", &self.allowed_keys)
            .field("merge_policy", &self.merge_policy.is_some())
            .finish()
    }
}
