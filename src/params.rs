//! Parameter lists and their native encoding.

use std::ffi::{c_char, CStr, CString};

use smallvec::SmallVec;

use crate::{Result, Value};

mod sealed {
    pub trait Sealed {}
}

use sealed::Sealed;

/// Converts some type into parameters that can be passed to a query.
///
/// The trait is sealed and not designed to be implemented by hand.
///
/// # Positional parameters
///
/// - For heterogeneous parameter lists use [`params!`]:
///     `params![1, "foo"]`.
/// - For homogeneous parameter types, arrays, slices and vectors are
///     supported: `[1, 2, 3]`.
///
/// # Named parameters
///
/// - For heterogeneous parameter lists use [`named_params!`]:
///     `named_params! { ":key1": 1, ":key2": "foo" }`.
/// - For homogeneous parameter types, arrays of pairs are supported:
///     `[(":key1", 2), (":key2", 3)]`.
///
/// A name may carry its marker (`:id`, `@id`, `$id`) or not (`id`); either
/// way every `:id`, `@id` and `$id` in the query is replaced.
///
/// [`params!`]: crate::params!
/// [`named_params!`]: crate::named_params!
pub trait IntoParams: Sealed {
    #[doc(hidden)]
    fn into_params(self) -> Result<Params>;
}

#[derive(Debug, Clone, PartialEq)]
#[doc(hidden)]
pub enum Params {
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

/// Convert an owned iterator into positional params.
pub fn params_from_iter<I>(iter: I) -> impl IntoParams
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    iter.into_iter().map(Into::into).collect::<Vec<Value>>()
}

impl Sealed for () {}
impl IntoParams for () {
    fn into_params(self) -> Result<Params> {
        Ok(Params::None)
    }
}

impl Sealed for Params {}
impl IntoParams for Params {
    fn into_params(self) -> Result<Params> {
        Ok(self)
    }
}

impl<T: Into<Value>> Sealed for Vec<T> {}
impl<T: Into<Value>> IntoParams for Vec<T> {
    fn into_params(self) -> Result<Params> {
        Ok(Params::Positional(self.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Value>> Sealed for Vec<(String, T)> {}
impl<T: Into<Value>> IntoParams for Vec<(String, T)> {
    fn into_params(self) -> Result<Params> {
        Ok(Params::Named(
            self.into_iter().map(|(k, v)| (k, v.into())).collect(),
        ))
    }
}

impl<T: Into<Value>, const N: usize> Sealed for [T; N] {}
impl<T: Into<Value>, const N: usize> IntoParams for [T; N] {
    fn into_params(self) -> Result<Params> {
        self.into_iter().collect::<Vec<_>>().into_params()
    }
}

impl<T: Into<Value>, const N: usize> Sealed for [(&str, T); N] {}
impl<T: Into<Value>, const N: usize> IntoParams for [(&str, T); N] {
    fn into_params(self) -> Result<Params> {
        self.into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<Vec<_>>()
            .into_params()
    }
}

impl<T: Into<Value> + Clone, const N: usize> Sealed for &[T; N] {}
impl<T: Into<Value> + Clone, const N: usize> IntoParams for &[T; N] {
    fn into_params(self) -> Result<Params> {
        self.iter().cloned().collect::<Vec<_>>().into_params()
    }
}

impl<T: Into<Value> + Clone> Sealed for &[T] {}
impl<T: Into<Value> + Clone> IntoParams for &[T] {
    fn into_params(self) -> Result<Params> {
        self.to_vec().into_params()
    }
}

/// Construct positional params from a heterogeneous set of values.
#[macro_export]
macro_rules! params {
    () => {
        ()
    };
    ($($value:expr),* $(,)?) => {
        $crate::params::Params::Positional(vec![$($crate::Value::from($value)),*])
    };
}

/// Construct named params from a heterogeneous set of values.
#[macro_export]
macro_rules! named_params {
    () => {
        ()
    };
    ($($param_name:literal: $value:expr),* $(,)?) => {
        $crate::params::Params::Named(vec![
            $(($param_name.to_string(), $crate::Value::from($value))),*
        ])
    };
}

/// The parameter array handed to a single native call.
///
/// Every value is rendered as text into its own NUL-terminated buffer, and a
/// contiguous array of pointers to those buffers is kept next to them. The
/// buffers live exactly as long as this value, so the array must not outlive
/// it. An empty list still produces one empty entry so the native side always
/// receives a non-null array.
pub struct QueryParams {
    buffers: Vec<CString>,
    ptrs: SmallVec<[*const c_char; 8]>,
}

impl QueryParams {
    /// The parameter array of a call without parameters.
    pub fn empty() -> QueryParams {
        QueryParams::from_buffers(vec![CString::default()])
    }

    /// Renders `values` as text. Fails on an interior NUL byte.
    pub fn encode<'a, I>(values: I) -> Result<QueryParams>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let buffers = values
            .into_iter()
            .map(|v| CString::new(v.to_text()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if buffers.is_empty() {
            return Ok(QueryParams::empty());
        }
        Ok(QueryParams::from_buffers(buffers))
    }

    fn from_buffers(buffers: Vec<CString>) -> QueryParams {
        // Moving a `CString` does not move its heap buffer, so the pointers
        // stay valid for as long as `buffers` is alive.
        let ptrs = buffers.iter().map(|b| b.as_ptr()).collect();
        QueryParams { buffers, ptrs }
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    /// Number of entries in the array, at least one.
    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    /// Always `false`: an empty list is encoded as a single empty entry.
    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CStr> {
        self.buffers.iter().map(CString::as_c_str)
    }
}

impl std::fmt::Debug for QueryParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}
