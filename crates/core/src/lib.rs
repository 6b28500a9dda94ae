// crates/core/src/lib.rs
pub mod aggregate;
pub mod collation;
pub mod config;
pub mod corpus;
pub mod error;
pub mod extraction;
pub mod query;
pub mod response;

pub use aggregate::{aggregate, AggregationPlan, ResultRow, RowQuery};
pub use config::AppConfig;
pub use corpus::CorpusInfo;
pub use error::*;
pub use extraction::{
    create_conf, ConfRequest, DbKind, ExtractionConf, ExtractionProgress, Extractor,
    ProcessExtractor,
};
pub use query::{export_key, import_key, AttrConstraint, QueryPayload, EMPTY_VALUE_PLACEHOLDER};
pub use response::{AttrValues, ListedValue, QueryAns, SubcSize};
