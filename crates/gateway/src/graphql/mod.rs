//! GraphQL schema and HTTP handlers

mod mutation;
mod query;
mod types;

pub use mutation::MutationRoot;
pub use query::QueryRoot;

use crate::AppState;
use async_graphql::{http::GraphiQLSource, EmptySubscription, Schema};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use receiptbox_common::services::{ItemService, ReceiptService};

/// Deepest selection accepted (receipt → items is two levels)
const MAX_QUERY_DEPTH: usize = 10;

pub type ReceiptSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the schema with the services resolvers call into
pub fn build_schema(receipts: ReceiptService, items: ItemService) -> ReceiptSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(receipts)
        .data(items)
        .limit_depth(MAX_QUERY_DEPTH)
        .finish()
}

/// POST /graphql (JSON or multipart)
pub async fn graphql_handler(State(state): State<AppState>, request: GraphQLRequest) -> GraphQLResponse {
    state.schema.execute(request.into_inner()).await.into()
}

/// GET /graphql
pub async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}
