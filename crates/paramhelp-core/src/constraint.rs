//! Pure validation of candidate values against a descriptor.
//!
//! Order is type, then element count, then bounds; the first failure wins.
//! Nothing here touches storage, so checks can run before the registry lock
//! is needed for the write.

use crate::descriptor::{Bounds, ParamDescriptor};
use crate::error::{ParamError, Result};
use crate::value::{format_double, ParamValue};

pub fn check(desc: &ParamDescriptor, value: &ParamValue) -> Result<()> {
    if value.ty() != desc.ty {
        return Err(ParamError::TypeViolation {
            name: desc.name.clone(),
            expected: desc.ty,
            found: value.ty(),
        });
    }

    if !desc.size.accepts(value.len()) {
        return Err(ParamError::SizeViolation {
            name: desc.name.clone(),
            expected: desc.size,
            found: value.len(),
        });
    }

    let outlier = match (desc.bounds, value) {
        (Bounds::Int { min, max }, ParamValue::Int(values)) => values
            .iter()
            .find(|v| !(min..=max).contains(*v))
            .map(i64::to_string),
        // NaN is never inside a range.
        (Bounds::Double { min, max }, ParamValue::Double(values)) => values
            .iter()
            .find(|v| !(min..=max).contains(*v))
            .map(|v| format_double(*v)),
        _ => None,
    };

    match outlier {
        Some(value) => Err(ParamError::BoundsViolation {
            name: desc.name.clone(),
            value,
            bounds: desc.bounds,
        }),
        None => Ok(()),
    }
}
