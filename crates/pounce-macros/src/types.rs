// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Type-definition macros.

/// Define a copyable index newtype.
///
/// The generated type prints as `<prefix><n>`, converts to and from its
/// inner integer, and exposes `index()` and `next()`.
///
/// # Example
///
/// ```
/// use pounce_macros::id_type;
///
/// id_type! {
///     pub GroupId(u64) => "G"
/// }
///
/// let g = GroupId::from(7u64);
/// assert_eq!(g.index(), 7);
/// assert_eq!(format!("{}", g.next()), "G8");
/// ```
#[macro_export]
macro_rules! id_type {
    ($(#[$meta:meta])* $vis:vis $name:ident($inner:ty) => $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        $vis struct $name(pub $inner);

        impl $name {
            /// Returns the raw index.
            #[inline]
            pub fn index(self) -> $inner {
                self.0
            }

            /// Returns the id that follows this one.
            #[inline]
            pub fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

/// Define an enum whose variants correspond to block menu values.
///
/// Menu values arrive from project files in arbitrary case, so `parse`
/// matches case-insensitively. `as_str` returns the canonical spelling.
///
/// # Example
///
/// ```
/// use pounce_macros::menu_enum;
///
/// menu_enum! {
///     #[derive(Debug, Clone, Copy, PartialEq)]
///     pub enum Style {
///         AllAround => "all around",
///         DontRotate => "don't rotate",
///     }
/// }
///
/// assert_eq!(Style::parse("ALL AROUND"), Some(Style::AllAround));
/// assert_eq!(Style::DontRotate.as_str(), "don't rotate");
/// assert_eq!(Style::ALL.len(), 2);
/// ```
#[macro_export]
macro_rules! menu_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $str:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the canonical menu value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }

            /// Parses a menu value, ignoring case and surrounding whitespace.
            pub fn parse(s: &str) -> Option<Self> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($str) {
                        return Some(Self::$variant);
                    }
                )+
                None
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_id_type() {
        id_type! {
            /// Test id.
            pub SlotId(usize) => "S"
        }

        let id = SlotId(0);
        assert_eq!(id.next(), SlotId(1));
        assert_eq!(usize::from(SlotId(4)), 4);
        assert_eq!(SlotId::default(), SlotId(0));
        assert_eq!(SlotId(12).to_string(), "S12");
    }

    #[test]
    fn test_menu_enum() {
        menu_enum! {
            #[derive(Debug, Clone, Copy, PartialEq)]
            enum Unit {
                Year => "YEAR",
                DayOfWeek => "DAYOFWEEK",
            }
        }

        assert_eq!(Unit::parse("year"), Some(Unit::Year));
        assert_eq!(Unit::parse(" dayofweek "), Some(Unit::DayOfWeek));
        assert_eq!(Unit::parse("minute"), None);
        assert_eq!(Unit::Year.to_string(), "YEAR");
        assert_eq!(Unit::ALL, &[Unit::Year, Unit::DayOfWeek]);
    }
}
