use core::fmt;
use core::num::NonZeroU32;

use crate::FdError;

/// Identifier of a numbered function in a model: an output sensor or a
/// forcing function.
///
/// Ids are positive; `0` is reserved for time and never names a function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub struct FunctionId(NonZeroU32);

impl FunctionId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for FunctionId {
    type Error = FdError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(FdError::InvalidFunctionId { raw })
    }
}

impl From<FunctionId> for u32 {
    fn from(id: FunctionId) -> Self {
        id.get()
    }
}

impl fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionId({})", self.get())
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}
