/// Constructs a [`Value`](crate::value::Value) literal, JSON-style.
///
/// Handy for building expected response trees in tests:
///
/// ```rust
/// # use trellis::engine_value;
/// let v = engine_value!({
///     "user": {
///         "name": "Alice",
///         "friends": [null, "Bob"],
///     },
/// });
/// ```
///
/// `null`, scalars, lists and objects nest arbitrarily. Any other expression
/// is converted through [`Value::from`](crate::value::Value::from).
#[macro_export]
macro_rules! engine_value {
    (null) => (
        $crate::value::Value::Null
    );
    ([ $($item:tt),* $(,)? ]) => (
        $crate::value::Value::List(vec![ $( $crate::engine_value!($item) ),* ])
    );
    ({ $($key:tt : $val:tt),* $(,)? }) => (
        $crate::value::Value::Object(
            [ $( ($key, $crate::engine_value!($val)) ),* ]
                .into_iter()
                .collect::<$crate::value::Object>(),
        )
    );
    ($e:expr) => (
        $crate::value::Value::from($e)
    );
}
