// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Testing helper macros.

/// Assert that an expression matches a pattern.
///
/// # Example
///
/// ```
/// use pounce_macros::assert_matches;
///
/// let value: Option<u32> = Some(3);
/// assert_matches!(value, Some(n) if n > 2);
/// ```
#[macro_export]
macro_rules! assert_matches {
    ($expr:expr, $pat:pat) => {
        match $expr {
            $pat => {}
            ref other => panic!(
                "`{}` does not match `{}`\n  found: {:?}",
                stringify!($expr),
                stringify!($pat),
                other
            ),
        }
    };
    ($expr:expr, $pat:pat if $guard:expr) => {
        match $expr {
            $pat if $guard => {}
            ref other => panic!(
                "`{}` does not match `{} if {}`\n  found: {:?}",
                stringify!($expr),
                stringify!($pat),
                stringify!($guard),
                other
            ),
        }
    };
}

/// Assert that two numbers are within a tolerance of each other.
///
/// The tolerance defaults to `1e-9`.
///
/// # Example
///
/// ```
/// use pounce_macros::assert_approx_eq;
///
/// assert_approx_eq!(0.1 + 0.2, 0.3);
/// assert_approx_eq!(10.0, 10.04, 0.05);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr) => {
        $crate::assert_approx_eq!($left, $right, 1e-9)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right, epsilon) = ($left as f64, $right as f64, $epsilon as f64);
        if (left - right).abs() > epsilon {
            panic!(
                "`{}` = {} is not within {} of `{}` = {}",
                stringify!($left),
                left,
                epsilon,
                stringify!($right),
                right
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_matches_guard() {
        let pair = (1, "a");
        assert_matches!(pair, (1, _));
        assert_matches!(pair, (n, s) if n == 1 && s == "a");
    }

    #[test]
    #[should_panic(expected = "is not within")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.0, 1.5, 0.1);
    }
}
