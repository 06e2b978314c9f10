use crate::bug::Bug;
use crate::client::BugzillaClient;
use crate::error::{BugzillaError, Result};
use crate::models::response::BugListBody;

/// Page size used when auto-paginating and the caller has not picked one.
/// There is no one right value; 8 is small enough not to overload the remote
/// but large enough to keep the request count reasonable.
pub const DEFAULT_PAGE_SIZE: u32 = 8;

/// Search parameters for the `bug` endpoint: arbitrary field/value filters plus
/// the typed knobs that steer pagination.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    params: Vec<(String, String)>,
    limit: Option<u32>,
    offset: Option<u32>,
    page_size: Option<u32>,
    resolve: bool,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a raw search filter, e.g. `("product", "plasmashell")`.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Caps the result count. Setting this opts out of auto-pagination.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results. Setting this opts out of
    /// auto-pagination.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Page size for auto-pagination, [`DEFAULT_PAGE_SIZE`] when unset.
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Resolve every fetched bug's history and post-status-change comments
    /// before it is handed out. Off by default; each resolution costs extra
    /// requests per bug.
    pub fn resolve(mut self, resolve: bool) -> Self {
        self.resolve = resolve;
        self
    }

    fn is_bounded(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    fn query_pairs(&self, limit: Option<u32>, offset: Option<u32>) -> Vec<(String, String)> {
        let mut pairs = self.params.clone();
        if let Some(limit) = limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        pairs
    }
}

impl BugzillaClient {
    /// Fetches a single bug by id or alias. Zero results for a valid response
    /// is reported as `NotFound`.
    pub async fn get_bug(&self, id_or_alias: &str) -> Result<Bug> {
        let path = format!("bug/{}", id_or_alias);
        let body: BugListBody = self.get(&path).await?;
        let mut bugs = bugs_from_body(body, self)?;
        if bugs.is_empty() {
            return Err(BugzillaError::NotFound(format!(
                "no bug matches `{}`",
                id_or_alias
            )));
        }
        Ok(bugs.remove(0))
    }

    /// Single bounded fetch: exactly one search request, the full result array
    /// back, in server order.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Bug>> {
        self.fetch_page(query, query.limit, query.offset).await
    }

    /// Searches with a page handler. Without explicit `limit`/`offset` the
    /// query auto-paginates: pages stream through `on_page` one at a time
    /// (bugs in server order), memory stays bounded to a single page, and the
    /// return value is `None`. With either knob set this degrades to the
    /// single bounded fetch, whose full result is both handed to `on_page`
    /// and returned.
    pub async fn search_paged<F>(&self, query: &SearchQuery, mut on_page: F) -> Result<Option<Vec<Bug>>>
    where
        F: FnMut(&[Bug]),
    {
        if query.is_bounded() {
            let bugs = self.fetch_page(query, query.limit, query.offset).await?;
            on_page(&bugs);
            return Ok(Some(bugs));
        }

        let limit = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut offset = 0;
        loop {
            let page = self.fetch_page(query, Some(limit), Some(offset)).await?;
            if page.is_empty() {
                break;
            }
            on_page(&page);
            offset += limit;
        }
        Ok(None)
    }

    async fn fetch_page(
        &self,
        query: &SearchQuery,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Bug>> {
        let owned = query.query_pairs(limit, offset);
        let pairs: Vec<(&str, &str)> = owned
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        let body: BugListBody = self.get_with_query("bug", Some(&pairs)).await?;
        let mut bugs = bugs_from_body(body, self)?;
        if query.resolve {
            for bug in &mut bugs {
                bug.resolve().await?;
            }
        }
        Ok(bugs)
    }
}

fn bugs_from_body(body: BugListBody, client: &BugzillaClient) -> Result<Vec<Bug>> {
    body.bugs
        .into_iter()
        .map(|fields| Bug::from_fields(fields, client.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BugzillaConfig;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn client_for(base_url: &str) -> BugzillaClient {
        let config = BugzillaConfig::new(base_url, "test-key").with_cooldown(Duration::ZERO);
        BugzillaClient::new(config).unwrap()
    }

    fn bug_list(ids: &[u64]) -> String {
        let bugs: Vec<_> = ids
            .iter()
            .map(|id| json!({ "id": id, "status": "CONFIRMED" }))
            .collect();
        json!({ "bugs": bugs }).to_string()
    }

    #[test]
    fn query_pairs_merge_filters_with_pagination_knobs() {
        let query = SearchQuery::new()
            .param("product", "plasmashell")
            .param("status", "CONFIRMED");

        let pairs = query.query_pairs(Some(3), Some(6));
        assert_eq!(
            pairs,
            vec![
                ("product".to_string(), "plasmashell".to_string()),
                ("status".to_string(), "CONFIRMED".to_string()),
                ("limit".to_string(), "3".to_string()),
                ("offset".to_string(), "6".to_string()),
            ]
        );

        assert!(query.query_pairs(None, None).len() == 2);
    }

    #[tokio::test]
    async fn get_bug_returns_the_first_match() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/bug/1234")
            .match_query(Matcher::Any)
            .with_body(bug_list(&[1234]))
            .create_async()
            .await;

        let client = client_for(&format!("{}/rest", server.url()));
        let bug = client.get_bug("1234").await.unwrap();
        assert_eq!(bug.id(), 1234);
    }

    #[tokio::test]
    async fn get_bug_with_zero_results_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/bug/no-such-alias")
            .match_query(Matcher::Any)
            .with_body(bug_list(&[]))
            .create_async()
            .await;

        let client = client_for(&format!("{}/rest", server.url()));
        let err = client.get_bug("no-such-alias").await.unwrap_err();
        assert!(matches!(err, BugzillaError::NotFound(_)));
    }

    #[tokio::test]
    async fn auto_pagination_streams_pages_until_the_server_runs_dry() {
        let mut server = mockito::Server::new_async().await;
        let batches: &[(u32, &[u64])] = &[
            (0, &[1, 2, 3]),
            (3, &[4, 5, 6]),
            (6, &[7, 8, 9]),
            (9, &[10, 11]),
            (12, &[]),
        ];
        let mut mocks = Vec::new();
        for (offset, ids) in batches {
            let mock = server
                .mock("GET", "/rest/bug")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("product".into(), "dolphin".into()),
                    Matcher::UrlEncoded("limit".into(), "3".into()),
                    Matcher::UrlEncoded("offset".into(), offset.to_string()),
                ]))
                .with_body(bug_list(ids))
                .expect(1)
                .create_async()
                .await;
            mocks.push(mock);
        }

        let client = client_for(&format!("{}/rest", server.url()));
        let query = SearchQuery::new().param("product", "dolphin").page_size(3);

        let mut pages: Vec<Vec<u64>> = Vec::new();
        let outcome = client
            .search_paged(&query, |page| {
                pages.push(page.iter().map(Bug::id).collect());
            })
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert_eq!(pages.len(), 4);
        let delivered: Vec<u64> = pages.iter().flatten().copied().collect();
        assert_eq!(delivered, (1..=11).collect::<Vec<u64>>());
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn bounded_fetch_issues_exactly_one_request_with_the_given_knobs() {
        for count in [0usize, 1, 5] {
            let ids: Vec<u64> = (1..=count as u64).collect();
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/rest/bug")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("limit".into(), "5".into()),
                    Matcher::UrlEncoded("offset".into(), "10".into()),
                ]))
                .with_body(bug_list(&ids))
                .expect(1)
                .create_async()
                .await;

            let client = client_for(&format!("{}/rest", server.url()));
            let query = SearchQuery::new().limit(5).offset(10);
            let bugs = client.search(&query).await.unwrap();

            assert_eq!(bugs.len(), count);
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn search_preserves_server_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/bug")
            .match_query(Matcher::Any)
            .with_body(bug_list(&[9, 3, 7, 1]))
            .create_async()
            .await;

        let client = client_for(&format!("{}/rest", server.url()));
        let bugs = client.search(&SearchQuery::new()).await.unwrap();
        let ids: Vec<u64> = bugs.iter().map(Bug::id).collect();
        assert_eq!(ids, vec![9, 3, 7, 1]);
    }

    #[tokio::test]
    async fn bounded_query_with_handler_hands_over_the_full_page_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/bug")
            .match_query(Matcher::AllOf(vec![Matcher::UrlEncoded(
                "limit".into(),
                "2".into(),
            )]))
            .with_body(bug_list(&[5, 6]))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&format!("{}/rest", server.url()));
        let query = SearchQuery::new().limit(2);

        let mut calls = 0;
        let outcome = client
            .search_paged(&query, |page| {
                calls += 1;
                assert_eq!(page.len(), 2);
            })
            .await
            .unwrap();

        assert_eq!(calls, 1);
        let bugs = outcome.expect("bounded searches return the array");
        assert_eq!(bugs.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn eager_resolution_fills_caches_and_survives_missing_status_changes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/bug")
            .match_query(Matcher::AllOf(vec![Matcher::UrlEncoded(
                "limit".into(),
                "10".into(),
            )]))
            .with_body(bug_list(&[1, 2]))
            .create_async()
            .await;
        let history_one = server
            .mock("GET", "/rest/bug/1/history")
            .match_query(Matcher::Any)
            .with_body(
                json!({
                    "bugs": [{ "id": 1, "history": [
                        { "when": "2020-02-01T00:00:00Z", "changes": [
                            { "field_name": "status", "removed": "NEW", "added": "CONFIRMED" }
                        ]}
                    ]}]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let comments_one = server
            .mock("GET", "/rest/bug/1/comment")
            .match_query(Matcher::UrlEncoded(
                "new_since".into(),
                "2020-02-01T00:00:00Z".into(),
            ))
            .with_body(
                json!({ "bugs": { "1": { "comments": [
                    { "creation_time": "2020-02-02T00:00:00Z", "text": "me too" }
                ]}}})
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let history_two = server
            .mock("GET", "/rest/bug/2/history")
            .match_query(Matcher::Any)
            .with_body(
                json!({
                    "bugs": [{ "id": 2, "history": [
                        { "when": "2020-01-15T00:00:00Z", "changes": [
                            { "field_name": "cc", "removed": "", "added": "new@example.org" }
                        ]}
                    ]}]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&format!("{}/rest", server.url()));
        let query = SearchQuery::new().limit(10).resolve(true);
        let mut bugs = client.search(&query).await.unwrap();

        // The bug without a status change did not abort the page.
        assert_eq!(bugs.len(), 2);

        // Bug 1 is fully resolved: both views come straight from cache.
        assert_eq!(bugs[0].comments_since_status_change().await.unwrap().len(), 1);
        // Bug 2 carries its stable precondition failure instead.
        let err = bugs[1].comments_since_status_change().await.unwrap_err();
        assert!(matches!(err, BugzillaError::Precondition(_)));

        history_one.assert_async().await;
        comments_one.assert_async().await;
        history_two.assert_async().await;
    }
}
