// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

/// Expand to a [`StructuralError::SortMismatch`] carrying the file and line
/// of the check site.
///
/// # Arguments
/// * `$expected` - the sort name the caller required
/// * `$have` - the sort name it actually found
///
/// [`StructuralError::SortMismatch`]: crate::StructuralError::SortMismatch
macro_rules! sort_mismatch {
    ($expected:expr, $have:expr) => {
        $crate::StructuralError::SortMismatch {
            expected: $expected,
            have: $have,
            file: file!(),
            line: line!(),
        }
    };
}

pub(crate) use sort_mismatch;
