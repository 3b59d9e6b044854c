use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Where in the code space an error comes from.
///
/// A handful of base codes cover concerns every crate shares; everything
/// engine-specific lives in `(group, code)` pairs declared through
/// [`define_strata_errors!`], one group per subsystem.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StrataErrorCode {
    Unknown,
    Deserialization,
    Serialization,
    InvalidAddress,
    InvalidDomain,
    Subsystem { group: u8, code: u16 },
}

impl Display for StrataErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StrataErrorCode::Unknown => f.write_str("unknown"),
            StrataErrorCode::Deserialization => f.write_str("deserialization"),
            StrataErrorCode::Serialization => f.write_str("serialization"),
            StrataErrorCode::InvalidAddress => f.write_str("invalid-address"),
            StrataErrorCode::InvalidDomain => f.write_str("invalid-domain"),
            StrataErrorCode::Subsystem { group, code } => write!(f, "{group}.{code}"),
        }
    }
}

/// An engine error: a code, a human-readable message template, and the
/// named arguments the template refers to.
///
/// Arguments are kept as strings next to the template instead of being
/// formatted into it eagerly, so callers can match on individual fields
/// (see [`StrataError::argument`]) without parsing the rendered message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StrataError {
    code: StrataErrorCode,
    template: String,
    arguments: BTreeMap<String, String>,
}

impl StrataError {
    #[inline]
    pub const fn code(&self) -> StrataErrorCode {
        self.code
    }

    /// The raw, uninterpolated message template.
    #[inline]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[inline]
    pub fn argument<S: AsRef<str>>(&self, field: S) -> Option<&str> {
        self.arguments.get(field.as_ref()).map(|x| x.as_str())
    }

    #[inline]
    pub fn arguments(&self) -> &BTreeMap<String, String> {
        &self.arguments
    }

    /// Constructor used by [`define_strata_errors!`]; not meant to be
    /// called directly.
    pub fn subsystem<const N: usize>(
        group: u8,
        code: u16,
        template: &str,
        arguments: [(&str, String); N],
    ) -> Self {
        Self {
            code: StrataErrorCode::Subsystem { group, code },
            template: template.to_string(),
            arguments: arguments
                .into_iter()
                .map(|(field, value)| (field.to_string(), value))
                .collect(),
        }
    }

    fn base(code: StrataErrorCode, template: &str, detail: impl Display) -> Self {
        Self {
            code,
            template: template.to_string(),
            arguments: BTreeMap::from([("detail".to_string(), detail.to_string())]),
        }
    }

    pub fn unknown(detail: impl Display) -> Self {
        Self::base(StrataErrorCode::Unknown, "Unknown error: {detail}.", detail)
    }

    pub fn deserialization_error(detail: impl Display) -> Self {
        Self::base(
            StrataErrorCode::Deserialization,
            "Failed to decode: {detail}.",
            detail,
        )
    }

    pub fn serialization_error(detail: impl Display) -> Self {
        Self::base(
            StrataErrorCode::Serialization,
            "Failed to encode: {detail}.",
            detail,
        )
    }

    pub fn invalid_address(detail: impl Display) -> Self {
        Self::base(
            StrataErrorCode::InvalidAddress,
            "Address is invalid: '{detail}'.",
            detail,
        )
    }

    pub fn invalid_domain(detail: impl Display) -> Self {
        Self::base(
            StrataErrorCode::InvalidDomain,
            "Domain identifier '{detail}' is not part of the domain set.",
            detail,
        )
    }
}

/// Declare one subsystem group of error constructors.
///
/// Each entry becomes a `pub fn` returning a [`StrataError`] whose code is
/// `(group, entry code)` and whose template names its arguments:
///
/// ```
/// strata_error::define_strata_errors!(
///     group 7 {
///         1 => register_torn(address): "Register of {address} is torn.",
///     }
/// );
/// ```
#[macro_export]
macro_rules! define_strata_errors {
    (
        group $group: literal {
            $( $code: literal => $name: ident ( $( $arg: ident ),* ): $template: literal ),* $(,)?
        }
    ) => {
        $(
            #[doc = $template]
            pub fn $name( $( $arg: impl ::std::fmt::Display ),* ) -> $crate::StrataError {
                $crate::StrataError::subsystem(
                    $group,
                    $code,
                    $template,
                    [ $( (stringify!($arg), ($arg).to_string()) ),* ],
                )
            }
        )*
    };
}

/// Text outside of fields, with `}}` collapsed to a literal brace.
fn write_plain(f: &mut Formatter<'_>, mut s: &str) -> std::fmt::Result {
    while let Some(i) = s.find("}}") {
        f.write_str(&s[..i + 1])?;
        s = &s[i + 2..];
    }
    f.write_str(s)
}

/// Rendering substitutes `{field}` from the argument table. `{{` and `}}`
/// escape literal braces; a field with no recorded argument is left in the
/// template untouched, which keeps a half-built error legible.
impl Display for StrataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            write_plain(f, &rest[..open])?;
            let after = &rest[open + 1..];
            if let Some(after_escape) = after.strip_prefix('{') {
                f.write_str("{")?;
                rest = after_escape;
                continue;
            }
            let Some(close) = after.find('}') else {
                f.write_str("{")?;
                rest = after;
                continue;
            };
            let field = &after[..close];
            match self.arguments.get(field) {
                Some(value) => f.write_str(value)?,
                None => write!(f, "{{{field}}}")?,
            }
            rest = &after[close + 1..];
        }
        write_plain(f, rest)
    }
}

impl std::error::Error for StrataError {}
