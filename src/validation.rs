// (c) Copyright 2026 The changeset authors. All rights reserved.
//! Per-key validation.
//!
//! A [`ValidatorMap`] associates dotted keys with a [`Rule`]: either one [`Validator`] or an
//! ordered list of them. Running a rule produces a [`Check`], which is either already decided or
//! still pending. Lists are fanned out and joined, and their verdicts reduced to one: the key
//! passes iff every validator passed, otherwise it fails with the reasons of every failing
//! validator, in list order.
//!
//! ```rust
//! # use changeset::validation::{Check, ValidationContext, ValidatorMap, Verdict};
//! let validators = ValidatorMap::new()
//!     .with("name", |cx: &ValidationContext<'_>| {
//!         if cx.new_value.as_str().is_some_and(|s| !s.is_empty()) {
//!             Verdict::Valid
//!         } else {
//!             Verdict::from("name is required")
//!         }
//!     })
//!     .with("name", |cx: &ValidationContext<'_>| {
//!         let value = cx.new_value.clone();
//!         Check::pending(async move {
//!             match value.as_str() {
//!                 Some("admin") => Verdict::from("name is taken"),
//!                 _ => Verdict::Valid,
//!             }
//!         })
//!     });
//! assert_eq!(validators.keys().collect::<Vec<_>>(), ["name"]);
//! ```
use crate::leaf::Validation;
use futures::{
    FutureExt,
    future::{self, LocalBoxFuture, join_all},
};
use serde_json::Value;
use smallvec::SmallVec;
use std::{collections::BTreeMap, fmt, future::Future, rc::Rc};

/// Everything a validator gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// The dotted key being written.
    pub key: &'a str,
    /// The value being written.
    pub new_value: &'a Value,
    /// The value the content currently holds at `key`, if any.
    pub old_value: Option<&'a Value>,
    /// The staged changes of the buffer, as plain values.
    pub changes: &'a Value,
    /// The content being buffered over.
    pub content: &'a Value,
}

/// A decided validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(Validation),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

impl From<Validation> for Verdict {
    fn from(validation: Validation) -> Self {
        Verdict::Invalid(validation)
    }
}

impl From<&str> for Verdict {
    fn from(reason: &str) -> Self {
        Verdict::Invalid(reason.into())
    }
}

impl From<String> for Verdict {
    fn from(reason: String) -> Self {
        Verdict::Invalid(reason.into())
    }
}

impl From<Vec<String>> for Verdict {
    fn from(reasons: Vec<String>) -> Self {
        Verdict::Invalid(reasons.into())
    }
}

impl<E: Into<Validation>> From<Result<(), E>> for Verdict {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Verdict::Valid,
            Err(reason) => Verdict::Invalid(reason.into()),
        }
    }
}

/// What a validator returns: a verdict now, or one later.
pub enum Check {
    Ready(Verdict),
    Pending(LocalBoxFuture<'static, Verdict>),
}

impl Check {
    /// Wraps a future resolving to anything convertible into a [`Verdict`].
    pub fn pending<F>(future: F) -> Self
    where
        F: Future + 'static,
        F::Output: Into<Verdict>,
    {
        Check::Pending(future.map(Into::into).boxed_local())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Check::Pending(_))
    }

    /// Returns the verdict if it is already decided.
    pub fn ready(self) -> Option<Verdict> {
        match self {
            Check::Ready(verdict) => Some(verdict),
            Check::Pending(_) => None,
        }
    }

    /// Resolves the check, waiting if needed.
    pub fn into_future(self) -> LocalBoxFuture<'static, Verdict> {
        match self {
            Check::Ready(verdict) => future::ready(verdict).boxed_local(),
            Check::Pending(pending) => pending,
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Ready(verdict) => f.debug_tuple("Ready").field(verdict).finish(),
            Check::Pending(_) => f.write_str("Pending"),
        }
    }
}

macro_rules! ready_check_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Check {
                fn from(value: $ty) -> Self {
                    Check::Ready(value.into())
                }
            }
        )*
    };
}

ready_check_from!(Verdict, Validation, &str, String, Vec<String>);

impl<E: Into<Validation>> From<Result<(), E>> for Check {
    fn from(result: Result<(), E>) -> Self {
        Check::Ready(result.into())
    }
}

/// Validates the value written to one key.
pub trait Validator {
    fn validate(&self, cx: &ValidationContext<'_>) -> Check;
}

impl<F, C> Validator for F
where
    F: Fn(&ValidationContext<'_>) -> C,
    C: Into<Check>,
{
    fn validate(&self, cx: &ValidationContext<'_>) -> Check {
        self(cx).into()
    }
}

/// The validators of one key.
#[derive(Clone)]
pub enum Rule {
    One(Rc<dyn Validator>),
    Many(Vec<Rc<dyn Validator>>),
}

impl Rule {
    /// Runs every validator of the rule.
    ///
    /// A single validator's check is returned as is. For a list, every validator is invoked
    /// in order; if any check is pending, all of them are awaited together before reducing.
    pub fn check(&self, cx: &ValidationContext<'_>) -> Check {
        let validators = match self {
            Rule::One(validator) => return validator.validate(cx),
            Rule::Many(validators) => validators,
        };
        let checks: SmallVec<[Check; 4]> = validators.iter().map(|v| v.validate(cx)).collect();
        if checks.iter().any(Check::is_pending) {
            let pending: Vec<_> = checks.into_iter().map(Check::into_future).collect();
            Check::Pending(join_all(pending).map(reduce).boxed_local())
        } else {
            Check::Ready(reduce(checks.into_iter().filter_map(Check::ready)))
        }
    }

    fn push(self, validator: Rc<dyn Validator>) -> Rule {
        match self {
            Rule::One(first) => Rule::Many(vec![first, validator]),
            Rule::Many(mut all) => {
                all.push(validator);
                Rule::Many(all)
            }
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::One(_) => f.write_str("One"),
            Rule::Many(all) => write!(f, "Many({})", all.len()),
        }
    }
}

/// Folds the verdicts of a list of validators into one.
fn reduce(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
    let mut failed = false;
    let mut reasons = Vec::new();
    for verdict in verdicts {
        if let Verdict::Invalid(validation) = verdict {
            failed = true;
            reasons.extend(validation.messages().iter().cloned());
        }
    }
    if failed {
        Verdict::Invalid(Validation::Messages(reasons))
    } else {
        Verdict::Valid
    }
}

/// Validators by dotted key.
#[derive(Clone, Default, Debug)]
pub struct ValidatorMap {
    rules: BTreeMap<String, Rule>,
}

impl ValidatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `validator` for `key`, after any validators already registered for it.
    pub fn with(mut self, key: impl Into<String>, validator: impl Validator + 'static) -> Self {
        self.add(key, validator);
        self
    }

    pub fn add(&mut self, key: impl Into<String>, validator: impl Validator + 'static) {
        let validator: Rc<dyn Validator> = Rc::new(validator);
        let key = key.into();
        let rule = match self.rules.remove(&key) {
            Some(rule) => rule.push(validator),
            None => Rule::One(validator),
        };
        self.rules.insert(key, rule);
    }

    /// Replaces the rule of `key`.
    pub fn insert(&mut self, key: impl Into<String>, rule: Rule) {
        self.rules.insert(key.into(), rule);
    }

    pub fn get(&self, key: &str) -> Option<&Rule> {
        self.rules.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs the rule of `cx.key`; keys without a rule are valid.
    pub fn check(&self, cx: &ValidationContext<'_>) -> Check {
        match self.rules.get(cx.key) {
            Some(rule) => rule.check(cx),
            None => Check::Ready(Verdict::Valid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn cx<'a>(key: &'a str, value: &'a Value, empty: &'a Value) -> ValidationContext<'a> {
        ValidationContext {
            key,
            new_value: value,
            old_value: None,
            changes: empty,
            content: empty,
        }
    }

    fn fails(reason: &'static str) -> impl Fn(&ValidationContext<'_>) -> Verdict {
        move |_| Verdict::from(reason)
    }

    fn passes(_: &ValidationContext<'_>) -> Verdict {
        Verdict::Valid
    }

    #[test]
    fn missing_rule_passes() {
        let (value, empty) = (json!(1), json!({}));
        let check = ValidatorMap::new().check(&cx("any", &value, &empty));
        assert_eq!(check.ready(), Some(Verdict::Valid));
    }

    #[test]
    fn single_validator_result_is_kept() {
        let (value, empty) = (json!(1), json!({}));
        let map = ValidatorMap::new().with("n", fails("bad"));
        assert_eq!(
            map.check(&cx("n", &value, &empty)).ready(),
            Some(Verdict::Invalid(Validation::Message("bad".into())))
        );
    }

    #[test]
    fn list_collects_failures_in_order() {
        let (value, empty) = (json!(1), json!({}));
        let map = ValidatorMap::new()
            .with("n", fails("first"))
            .with("n", passes)
            .with("n", fails("second"));
        assert_eq!(
            map.check(&cx("n", &value, &empty)).ready(),
            Some(Verdict::from(vec!["first".to_string(), "second".to_string()]))
        );
    }

    #[test]
    fn list_of_passes_is_valid() {
        let (value, empty) = (json!(1), json!({}));
        let map = ValidatorMap::new().with("n", passes).with("n", passes);
        assert_eq!(
            map.check(&cx("n", &value, &empty)).ready(),
            Some(Verdict::Valid)
        );
    }

    #[test]
    fn pending_member_makes_the_list_pending() {
        let (value, empty) = (json!(1), json!({}));
        let map = ValidatorMap::new()
            .with("n", fails("sync"))
            .with("n", |_: &ValidationContext<'_>| {
                Check::pending(async { Verdict::from("async") })
            });
        let check = map.check(&cx("n", &value, &empty));
        assert!(check.is_pending());
        assert_eq!(
            block_on(check.into_future()),
            Verdict::from(vec!["sync".to_string(), "async".to_string()])
        );
    }

    #[test]
    fn result_conversion() {
        let ok: Result<(), &str> = Ok(());
        assert_eq!(Verdict::from(ok), Verdict::Valid);
        assert_eq!(
            Verdict::from(Err::<(), _>("nope")),
            Verdict::Invalid("nope".into())
        );
    }
}
