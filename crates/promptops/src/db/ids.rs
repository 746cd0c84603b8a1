use sea_orm::DbErr;
use sea_orm::sea_query::{ArrayType, ColumnType, Nullable, Value, ValueType, ValueTypeErr};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            Copy,
            Debug,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i32);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<$name> for Value {
            fn from(value: $name) -> Self {
                Value::Int(Some(value.0))
            }
        }

        impl sea_orm::TryGetable for $name {
            fn try_get_by<I: sea_orm::ColIdx>(
                res: &sea_orm::QueryResult,
                index: I,
            ) -> Result<Self, sea_orm::TryGetError> {
                Ok(Self(i32::try_get_by(res, index)?))
            }
        }

        impl ValueType for $name {
            fn try_from(v: Value) -> Result<Self, ValueTypeErr> {
                match v {
                    Value::TinyInt(Some(int)) => int.try_into().map_err(|_| ValueTypeErr),
                    Value::SmallInt(Some(int)) => int.try_into().map_err(|_| ValueTypeErr),
                    Value::Int(Some(int)) => Ok(int),
                    Value::BigInt(Some(int)) => int.try_into().map_err(|_| ValueTypeErr),
                    _ => Err(ValueTypeErr),
                }
                .map(Self)
            }

            fn type_name() -> String {
                stringify!($name).into()
            }

            fn array_type() -> ArrayType {
                ArrayType::Int
            }

            fn column_type() -> ColumnType {
                ColumnType::Integer
            }
        }

        impl sea_orm::TryFromU64 for $name {
            fn try_from_u64(n: u64) -> Result<Self, DbErr> {
                Ok(Self(n.try_into().map_err(|_| {
                    DbErr::ConvertFromU64(stringify!($name))
                })?))
            }
        }

        impl Nullable for $name {
            fn null() -> Value {
                Value::Int(None)
            }
        }
    };
}

id_type!(ModelId);
id_type!(PromptId);
id_type!(UsageRecordId);
id_type!(UserId);
