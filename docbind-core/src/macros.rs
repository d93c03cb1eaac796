/// Builds a `Vec<Argument>` from values of mixed types.
///
/// ```ignore
/// use docbind_core::args;
///
/// let arguments = args!["$name", 42, true];
/// assert_eq!(arguments.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::codec::Argument>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::codec::Argument::from($value)),+]
    };
}
