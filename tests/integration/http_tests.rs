//! End-to-end collection against a mock HTTP server
//!
//! These tests run the real HTTP-backed browser and HTML page script, so the
//! full path from tab to extracted record is exercised.

use group_harvest::bus::{BusError, EventStream, ExtractionRequest};
use group_harvest::collector::{
    build_http_client, Browser, BusExtractor, CollectionCoordinator, FixedDelayPolicy,
    HtmlPageScript, HttpBrowser, TabOptions,
};
use group_harvest::config::UserAgentConfig;
use group_harvest::model::{CollectionSettings, RunStatus, Target};
use group_harvest::storage::RunStore;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GROUP_PAGE: &str = r#"<html><head><title>Makers</title></head><body>
  <div role="feed">
    <div role="article">
      <a role="link" tabindex="0" href="/profile/alice.w/">Alice Walker</a>
      <a href="/groups/makers/posts/1/"><span>July 10 at 3:45 PM</span></a>
      <div data-ad-preview="message">Finished the workbench today</div>
      <div aria-label="Comment">
        <a role="link" href="/bob.k/">Bob K</a>
        <div data-ad-comet-preview="message">Looks solid</div>
      </div>
    </div>
    <div role="article">
      <a role="link" tabindex="0" href="/profile/dan.o/">Dan O</a>
      <a href="/groups/makers/posts/2/"><span>July 9 at 9:05 AM</span></a>
      <div data-ad-preview="message">Anyone selling a lathe?</div>
    </div>
  </div>
</body></html>"#;

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        name: "TestHarvest".to_string(),
        version: "1.0".to_string(),
        contact_url: "https://example.com/about".to_string(),
        contact_email: "admin@example.com".to_string(),
    }
}

fn http_browser() -> Arc<HttpBrowser> {
    let client = build_http_client(&user_agent()).unwrap();
    Arc::new(HttpBrowser::new(client, Arc::new(HtmlPageScript::new())))
}

fn coordinator(browser: Arc<HttpBrowser>) -> CollectionCoordinator {
    CollectionCoordinator::builder(
        browser,
        Arc::new(BusExtractor::new(Duration::from_secs(5))),
        RunStore::in_memory(),
        EventStream::new(64),
    )
    .rate_limit(FixedDelayPolicy::none())
    .tab_options(TabOptions::immediate())
    .build()
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_collects_posts_and_comments_from_group_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups/makers/"))
        .and(header(
            "user-agent",
            "TestHarvest/1.0 (+https://example.com/about; admin@example.com)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_raw(GROUP_PAGE, "text/html"))
        .mount(&server)
        .await;

    let browser = http_browser();
    let coordinator = coordinator(browser.clone());
    let target = Target::new(
        "makers",
        "Makers",
        format!("{}/groups/makers/", server.uri()),
    );

    let settings = CollectionSettings {
        items_per_target: 10,
        include_secondary: true,
        use_simulated_data: false,
    };
    assert!(coordinator.start(vec![target], settings).await.accepted);
    assert_eq!(coordinator.run_to_end().await, RunStatus::Completed);

    let records = coordinator.records();
    assert_eq!(records.len(), 2);

    let first = &records[0];
    assert_eq!(first.target_id, "makers");
    assert_eq!(first.poster_name, "Alice Walker");
    assert_eq!(first.date, "July 10");
    assert_eq!(first.time, "3:45 PM");
    assert_eq!(first.content, "Finished the workbench today");
    assert_eq!(first.comments.len(), 1);
    assert_eq!(first.comments[0].commenter_name, "Bob K");
    assert_eq!(first.comments[0].text, "Looks solid");

    assert_eq!(records[1].poster_name, "Dan O");
    assert!(records[1].comments.is_empty());

    // The tab is gone once the target is done
    assert_eq!(browser.open_tabs().await, 0);
}

#[tokio::test]
async fn test_missing_page_is_an_item_failure() {
    let server = MockServer::start().await;
    mount_page(&server, "/groups/first/", GROUP_PAGE).await;
    Mock::given(method("GET"))
        .and(path("/groups/missing/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_page(&server, "/groups/last/", GROUP_PAGE).await;

    let coordinator = coordinator(http_browser());
    let queue = ["first", "missing", "last"]
        .iter()
        .map(|id| Target::new(*id, *id, format!("{}/groups/{}/", server.uri(), id)))
        .collect();

    let settings = CollectionSettings {
        items_per_target: 1,
        include_secondary: false,
        use_simulated_data: false,
    };
    coordinator.start(queue, settings).await;
    assert_eq!(coordinator.run_to_end().await, RunStatus::Completed);

    let run = coordinator.snapshot();
    assert_eq!(run.cursor(), 3);
    assert_eq!(run.failures().len(), 1);
    assert_eq!(run.failures()[0].target_id, "missing");
    assert!(run.failures()[0].message.contains("404"));

    let ids: Vec<_> = run.records().iter().map(|r| r.target_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "last"]);
}

#[tokio::test]
async fn test_page_without_posts_is_an_item_failure() {
    let server = MockServer::start().await;
    mount_page(&server, "/groups/quiet/", "<html><body><p>Nothing here</p></body></html>").await;

    let coordinator = coordinator(http_browser());
    let target = Target::new("quiet", "Quiet", format!("{}/groups/quiet/", server.uri()));
    coordinator
        .start(vec![target], CollectionSettings::default())
        .await;
    assert_eq!(coordinator.run_to_end().await, RunStatus::Completed);

    let run = coordinator.snapshot();
    assert!(run.records().is_empty());
    assert_eq!(run.failures().len(), 1);
    assert!(run.failures()[0].message.contains("No posts found"));
}

#[tokio::test]
async fn test_closed_tab_is_unreachable() {
    let server = MockServer::start().await;
    mount_page(&server, "/groups/makers/", GROUP_PAGE).await;

    let browser = http_browser();
    let handle = browser
        .open_tab(&format!("{}/groups/makers/", server.uri()), false)
        .await
        .unwrap();
    handle.loaded.await.unwrap();

    let channel = browser.connect(handle.id).await.unwrap();
    let request = ExtractionRequest {
        items_per_target: 1,
        include_secondary: false,
    };
    let response = channel
        .request(&request, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(response.into_result().unwrap().len(), 1);

    browser.close_tab(handle.id).await.unwrap();
    let result = channel.request(&request, Duration::from_secs(5)).await;
    assert!(matches!(result, Err(BusError::Unreachable)));

    // Closing twice is fine
    assert!(browser.close_tab(handle.id).await.is_ok());
}
