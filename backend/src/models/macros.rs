/// Declares `i64` row-id newtypes that serialize as the bare integer and
/// display without decoration.
///
/// ```ignore
/// crate::row_id!(ForecastId, ForecastErrorId);
/// ```
#[macro_export]
macro_rules! row_id {
    ($($name:ident),+ $(,)?) => {
        $(
            #[derive(
                Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
                serde::Serialize, serde::Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(pub i64);

            impl ::std::fmt::Display for $name {
                fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                    ::std::fmt::Display::fmt(&self.0, f)
                }
            }

            impl ::std::convert::From<i64> for $name {
                fn from(id: i64) -> Self {
                    $name(id)
                }
            }
        )+
    };
}
