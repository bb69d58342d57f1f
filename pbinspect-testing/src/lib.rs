//! Internal testing utilities for the pbinspect crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

mod wire;

pub use wire::{encode_varint, encode_zigzag, MessageBuilder};

/// Utility for creating parametrized (aka. table-driven) tests.
///
/// To create a table driven test:
///
/// 1. Import the `TestCases` trait
/// 2. Create a struct, conventionally named `Case`, that contains the data
///    for a single test case. This struct must implement `Debug`.
/// 3. Create a collection of `Case` instances (eg. an array or Vec),
///    conventionally named `cases`.
/// 4. Call `cases.test_each`, passing the test function as a closure
///
/// `test_each` will run all of the test cases and catch any panics. If all
/// cases succeed (ie. run without panicking), `test_each` will return.
/// Otherwise it will panic with a message that includes the count and debug
/// representations of failing test cases.
///
/// ## Example
///
/// ```
/// use pbinspect_testing::{encode_varint, TestCases};
///
/// // Add #[test] attribute
/// fn test_varint_len() {
///   #[derive(Debug)]
///   struct Case {
///     value: u64,
///     expected_len: usize,
///   }
///
///   let cases = [
///     Case { value: 1, expected_len: 1 },
///     Case { value: 300, expected_len: 2 },
///   ];
///
///   cases.test_each(|&Case { value, expected_len }| {
///     assert_eq!(encode_varint(value).len(), expected_len);
///   });
/// }
/// # test_varint_len();
/// ```
///
/// ## Unwind safety
///
/// Both test cases and the test function are required to be
/// [unwind safe](https://doc.rust-lang.org/std/panic/fn.catch_unwind.html).
/// Decoder inputs are plain byte vectors, so this rarely matters in practice.
/// Values captured by the test function which hold interior mutability can be
/// wrapped in [`AssertUnwindSafe`](std::panic::AssertUnwindSafe).
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call test function `test` with each test case in `self`, catching any panics.
    ///
    /// After all cases have been evaluated, return if no panics occurred or
    /// panic with details of failing cases otherwise.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes test cases
    /// to the test function by value.
    ///
    /// Each case is formatted to a string before the test function is called,
    /// so that failures can still be reported after the case is moved.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let mut failures = Vec::new();
        for case in self {
            if std::panic::catch_unwind(|| {
                test(&case);
            })
            .is_err()
            {
                failures.push(case);
            }
        }
        assert_eq!(
            failures.len(),
            0,
            "{} test cases failed: {:?}",
            failures.len(),
            failures
        );
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe,
    {
        let mut failures = Vec::new();
        for case in self {
            let test = &test;
            let case_str = format!("{:?}", case);

            if std::panic::catch_unwind(move || {
                test(case);
            })
            .is_err()
            {
                failures.push(case_str);
            }
        }
        assert_eq!(
            failures.len(),
            0,
            "{} test cases failed: {:?}",
            failures.len(),
            failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::TestCases;

    #[test]
    fn test_test_cases_success() {
        #[derive(Clone, Debug)]
        struct Case {
            x: i32,
        }

        let cases = [Case { x: 1 }, Case { x: 2 }];
        cases.clone().test_each(|case| _ = case.x);
        cases.clone().test_each_value(|case| _ = case.x);
    }

    #[test]
    #[should_panic(expected = "2 test cases failed")]
    fn test_test_each_failure() {
        #[derive(Debug)]
        struct Case {
            x: i32,
        }

        let cases = [Case { x: 1 }, Case { x: 2 }];
        cases.test_each(|case| {
            _ = case.x;
            panic!("oh no");
        })
    }
}
