// (c) Copyright 2026 The changeset authors. All rights reserved.
/// Builds a [`ValidatorMap`](crate::ValidatorMap) from `key => validator` pairs.
///
/// A bracketed list registers several validators for one key, in order.
///
/// ```rust
/// # use changeset::{validators, validation::{ValidationContext, Verdict}};
/// fn required(cx: &ValidationContext<'_>) -> Verdict {
///     match cx.new_value {
///         serde_json::Value::Null => Verdict::from("required"),
///         _ => Verdict::Valid,
///     }
/// }
///
/// let map = validators! {
///     "name" => required,
///     "email" => [required, |cx: &ValidationContext<'_>| {
///         cx.new_value.as_str().is_some_and(|s| s.contains('@')).then_some(()).ok_or("not an email")
///     }],
/// };
/// assert_eq!(map.keys().collect::<Vec<_>>(), ["email", "name"]);
/// ```
#[macro_export]
macro_rules! validators {
    (@add $map:ident;) => {};
    (@add $map:ident; $key:literal => [$($validator:expr),* $(,)?] $(, $($rest:tt)*)?) => {
        $( $map.add($key, $validator); )*
        $crate::validators!(@add $map; $($($rest)*)?);
    };
    (@add $map:ident; $key:literal => $validator:expr $(, $($rest:tt)*)?) => {
        $map.add($key, $validator);
        $crate::validators!(@add $map; $($($rest)*)?);
    };
    ($($body:tt)*) => {
        {
            #[allow(unused_mut)]
            let mut map = $crate::ValidatorMap::new();
            $crate::validators!(@add map; $($body)*);
            map
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{
        Changeset, Invalid, Outcome,
        validation::{ValidationContext, Verdict},
    };
    use serde_json::json;

    fn positive(cx: &ValidationContext<'_>) -> Verdict {
        match cx.new_value.as_i64() {
            Some(n) if n > 0 => Verdict::Valid,
            _ => Verdict::from("must be positive"),
        }
    }

    fn even(cx: &ValidationContext<'_>) -> Verdict {
        match cx.new_value.as_i64() {
            Some(n) if n % 2 == 0 => Verdict::Valid,
            _ => Verdict::from("must be even"),
        }
    }

    #[test]
    fn empty() {
        assert!(validators! {}.is_empty());
    }

    #[test]
    fn lists_keep_their_order() {
        let buffer = Changeset::new(json!({}), validators! { "n" => [positive, even] });
        let outcome = buffer.set("n", -3).unwrap();
        assert_eq!(
            outcome.as_ready(),
            Some(&Outcome::Invalid(Invalid::new(
                -3,
                vec!["must be positive", "must be even"]
            )))
        );
    }
}
