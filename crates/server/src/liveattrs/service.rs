// crates/server/src/liveattrs/service.rs
//! Attribute queries over the metadata store, with and without the cache.

use std::sync::Arc;

use corpadm_core::{
    aggregate, create_conf, AggregationPlan, ConfRequest, CorpusInfo, ExtractionConf,
    QueryAns, QueryPayload,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn corpus_info(state: &AppState, corpus_id: &str) -> ApiResult<CorpusInfo> {
    state
        .db
        .load_corpus_info(corpus_id)
        .await?
        .ok_or_else(|| ApiError::CorpusNotFound(corpus_id.to_string()))
}

/// Attributes listed in every answer: those of the stored extraction
/// configuration, or the corpus's subcorpus attributes if there is none.
async fn default_attrs(state: &AppState, corpus: &CorpusInfo) -> ApiResult<Vec<String>> {
    if let Some(conf) = state.conf_loader.get(&corpus.name).await? {
        return Ok(conf.subcorp_attrs());
    }
    Ok(corpus
        .subcorp_attrs
        .iter()
        .flat_map(|(stru, attrs)| attrs.iter().map(move |a| format!("{stru}.{a}")))
        .collect())
}

/// Run the aggregation engine for `query`, bypassing the cache.
pub async fn compute_attr_values(
    state: &AppState,
    corpus: &CorpusInfo,
    query: &QueryPayload,
) -> ApiResult<QueryAns> {
    let defaults = default_attrs(state, corpus).await?;
    let plan = AggregationPlan::build(
        corpus,
        &defaults,
        query,
        state.config.liveattrs.max_attr_list_size,
    )?;
    let ans = aggregate(&plan, state.db.stream_rows(&plan.row_query)).await?;
    Ok(ans)
}

/// Cached attribute query. Only a cache miss counts towards usage.
pub async fn query_attr_values(
    state: &AppState,
    corpus: &CorpusInfo,
    query: &QueryPayload,
) -> ApiResult<Arc<QueryAns>> {
    if let Some(hit) = state.cache.get(&corpus.name, query) {
        tracing::debug!(corpus_id = %corpus.name, "query cache hit");
        return Ok(hit);
    }
    let ans = compute_attr_values(state, corpus, query).await?;
    state
        .usage
        .record(&corpus.name, query.attrs.keys().cloned().collect());
    Ok(state.cache.set(&corpus.name, query, ans))
}

/// The extraction configuration for `corpus`: the stored one, unless
/// `regenerate` is set or none exists, in which case a new one is generated
/// from corpus metadata and stored.
pub async fn resolve_conf(
    state: &AppState,
    corpus: &CorpusInfo,
    req: &ConfRequest,
    regenerate: bool,
) -> ApiResult<ExtractionConf> {
    if !regenerate {
        if let Some(conf) = state.conf_loader.get(&corpus.name).await? {
            return Ok(conf);
        }
    }
    let conf = create_conf(corpus, req)?;
    state.conf_loader.save(&conf).await?;
    Ok(conf)
}
