use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "uploaded_files")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub file_name: String,
    #[serde(skip)]
    pub file_data: Vec<u8>,
    pub file_size: i64,
    #[sea_orm(column_type = "String(StringLen::N(100))", nullable)]
    pub file_type: Option<String>,
    #[sea_orm(column_type = "String(StringLen::N(50))")]
    pub region: String,
    pub upload_duration_ms: Option<i32>,
    #[sea_orm(default_expr = "Expr::current_timestamp()")]
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
