//! Release adapters against mock forge and vendor endpoints.

use bluefin_releases_lib::model::{ReleaseOrigin, RepoKind, SourceRepository};
use bluefin_releases_lib::sources::forges::{GitHubReleases, GitLabReleases};
use bluefin_releases_lib::sources::http::{HttpClient, HttpSettings};
use bluefin_releases_lib::sources::vendor::{MozillaReleases, MozillaSettings};
use bluefin_releases_lib::sources::{Governor, ProviderResult, ReleaseSource, ReleaseTarget};
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{header_exists, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http(token: Option<&str>) -> HttpClient {
    HttpClient::new(&HttpSettings {
        max_retries: 0,
        token: token.map(str::to_string),
        ..HttpSettings::default()
    })
    .unwrap()
}

/// A client that trusts the mock server with the credential, as it would `api.github.com`.
fn github_http(token: &str, server: &MockServer) -> HttpClient {
    HttpClient::new(&HttpSettings {
        max_retries: 0,
        token: Some(token.to_string()),
        credential_origins: vec![server.uri()],
        ..HttpSettings::default()
    })
    .unwrap()
}

fn target(package_id: &str, repo: Option<SourceRepository>, limit: usize) -> ReleaseTarget {
    ReleaseTarget {
        package_id: package_id.into(),
        repo,
        limit,
        tag_prefix: None,
    }
}

fn found<T: core::fmt::Debug>(result: ProviderResult<T>) -> T {
    match result {
        ProviderResult::Found(value) => value,
        other => panic!("expected a result, got {other:?}"),
    }
}

async fn serve_github_releases(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/sharkdp/bat/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"tag_name": "v0.26.0-rc1", "name": "v0.26.0-rc1", "html_url": "https://github.com/sharkdp/bat/releases/tag/v0.26.0-rc1", "published_at": "2025-05-20T00:00:00Z", "prerelease": true},
            {"tag_name": "v0.25.0", "name": "", "body": "- **Fast** output", "html_url": "https://github.com/sharkdp/bat/releases/tag/v0.25.0", "published_at": "2025-01-07T00:00:00Z"},
            {"tag_name": "v0.24.0", "name": "v0.24.0", "body": "", "html_url": "https://github.com/sharkdp/bat/releases/tag/v0.24.0", "published_at": "2023-10-11T00:00:00Z"},
            {"tag_name": "v0.23.0", "name": "v0.23.0", "html_url": "https://github.com/sharkdp/bat/releases/tag/v0.23.0", "published_at": "2023-03-25T00:00:00Z", "draft": true}
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
async fn github_releases_skip_drafts_and_prereleases() {
    let server = MockServer::start().await;
    serve_github_releases(&server).await;

    let source = GitHubReleases::new(http(None), server.uri(), Governor::unlimited("github"));
    let releases = found(source.fetch_releases(&target("homebrew-bat", Some(SourceRepository::github("sharkdp", "bat")), 5)).await);

    let versions: Vec<_> = releases.iter().map(|r| r.version.as_str()).collect();
    assert_eq!(versions, ["v0.25.0", "v0.24.0"]);
    assert_eq!(releases[0].title, "v0.25.0");
    assert!(releases[0].description.contains("<strong>Fast</strong>"));
    assert!(releases.iter().all(|r| r.origin == ReleaseOrigin::GitHub));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
async fn github_releases_honor_the_limit() {
    let server = MockServer::start().await;
    serve_github_releases(&server).await;

    let source = GitHubReleases::new(http(None), server.uri(), Governor::unlimited("github"));
    let releases = found(source.fetch_releases(&target("homebrew-bat", Some(SourceRepository::github("sharkdp", "bat")), 1)).await);

    assert_eq!(releases.len(), 1);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
async fn github_releases_filter_by_tag_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/ublue-os/bluefin/releases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"tag_name": "gts-20250529", "html_url": "", "published_at": "2025-05-29T00:00:00Z"},
            {"tag_name": "stable-20250528", "html_url": "", "published_at": "2025-05-28T00:00:00Z"},
            {"tag_name": "stable-20250521", "html_url": "", "published_at": "2025-05-21T00:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let source = GitHubReleases::new(http(None), server.uri(), Governor::unlimited("github"));
    let mut t = target("bluefin-os-stable", Some(SourceRepository::github("ublue-os", "bluefin")), 30);
    t.tag_prefix = Some("stable-".into());
    let releases = found(source.fetch_releases(&t).await);

    let versions: Vec<_> = releases.iter().map(|r| r.version.as_str()).collect();
    assert_eq!(versions, ["stable-20250528", "stable-20250521"]);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
async fn github_token_is_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/sharkdp/bat/releases"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/sharkdp/bat/releases"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1750000000"),
        )
        .mount(&server)
        .await;

    let t = target("homebrew-bat", Some(SourceRepository::github("sharkdp", "bat")), 5);

    let authenticated = GitHubReleases::new(github_http("secret", &server), server.uri(), Governor::unlimited("github"));
    assert!(found(authenticated.fetch_releases(&t).await).is_empty());

    let anonymous = GitHubReleases::new(http(None), server.uri(), Governor::unlimited("github"));
    let ProviderResult::RateLimited(Some(info)) = anonymous.fetch_releases(&t).await else {
        panic!("expected the anonymous request to be rate limited");
    };
    assert_eq!(info.remaining, 0);
    assert_eq!(info.reset_at, Utc.timestamp_opt(1_750_000_000, 0).unwrap());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
async fn github_source_rejects_other_forges() {
    let source = GitHubReleases::new(http(None), "http://127.0.0.1:9", Governor::unlimited("github"));
    let repo = SourceRepository::detect("https://gitlab.gnome.org/GNOME/gnome-maps");

    let result = source.fetch_releases(&target("org.gnome.Maps", repo, 5)).await;

    assert!(matches!(result, ProviderResult::Unavailable(_)));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
async fn gitlab_releases_from_any_instance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v4/projects/[^/]+/releases$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"tag_name": "49.0", "name": "GNOME Maps 49.0", "description": "* New search", "released_at": "2025-09-15T00:00:00Z", "upcoming_release": true},
            {"tag_name": "48.2", "name": "", "description": "Fixes", "released_at": "2025-04-30T00:00:00Z"},
            {"tag_name": "48.1", "description": null, "released_at": "2025-03-01T00:00:00Z", "_links": {"self": "https://example.org/releases/48.1"}}
        ])))
        .mount(&server)
        .await;

    let repo = SourceRepository {
        kind: RepoKind::GitLab,
        url: format!("{}/GNOME/gnome-maps", server.uri()),
        owner: Some("GNOME".into()),
        repo: Some("gnome-maps".into()),
    };
    let source = GitLabReleases::new(http(Some("github-only")), Governor::unlimited("gitlab"));
    let releases = found(source.fetch_releases(&target("org.gnome.Maps", Some(repo), 5)).await);

    let versions: Vec<_> = releases.iter().map(|r| r.version.as_str()).collect();
    assert_eq!(versions, ["48.2", "48.1"]);
    assert_eq!(releases[0].title, "48.2");
    assert_eq!(releases[0].url, format!("{}/GNOME/gnome-maps/-/releases/48.2", server.uri()));
    assert_eq!(releases[1].url, "https://example.org/releases/48.1");
    assert!(releases.iter().all(|r| r.origin == ReleaseOrigin::GitLab));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.headers.contains_key("authorization")));
}

const FIREFOX_NOTES: &str = r#"
<html><body>
<p>Firefox Release <time datetime="2025-05-27">May 27, 2025</time></p>
<section><h3>New</h3>
<ul>
  <li class="release-note"><div class="release-note-content">Tab groups are <a href="https://support.mozilla.org/tab-groups">available</a>.</div></li>
</ul></section>
<section><h3>Fixed</h3>
<ul>
  <li class="release-note"><div class="release-note-content">Various <code>security</code> fixes.</div></li>
</ul></section>
</body></html>
"#;

fn mozilla(server: &MockServer) -> MozillaReleases {
    MozillaReleases::new(
        http(None),
        MozillaSettings {
            product_details: format!("{}/product-details", server.uri()),
            firefox_notes: format!("{}/firefox", server.uri()),
            thunderbird_notes: format!("{}/thunderbird", server.uri()),
        },
        Governor::unlimited("mozilla"),
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
    )
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
async fn mozilla_scrapes_the_latest_firefox_notes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product-details/firefox_versions.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"LATEST_FIREFOX_VERSION": "139.0", "FIREFOX_ESR": "128.11.0esr"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/firefox/139.0/releasenotes/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIREFOX_NOTES))
        .mount(&server)
        .await;

    let source = mozilla(&server);
    let t = target("org.mozilla.firefox", SourceRepository::detect("https://github.com/mozilla/gecko-dev"), 5);
    assert!(source.claims(&t));

    let releases = found(source.fetch_releases(&t).await);
    assert_eq!(releases.len(), 1);

    let release = &releases[0];
    assert_eq!(release.version, "139.0");
    assert_eq!(release.title, "Firefox 139.0");
    assert_eq!(release.origin, ReleaseOrigin::Vendor);
    assert_eq!(release.date, Utc.with_ymd_and_hms(2025, 5, 27, 0, 0, 0).unwrap());
    assert_eq!(release.url, format!("{}/firefox/139.0/releasenotes/", server.uri()));
    assert!(release.description.contains("<h2>New</h2>"));
    assert!(release.description.contains(r#"<a href="https://support.mozilla.org/tab-groups">available</a>"#));
    assert!(release.description.contains("<code>security</code>"));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
async fn mozilla_ignores_other_packages() {
    let server = MockServer::start().await;
    let source = mozilla(&server);

    assert!(!source.claims(&target("org.gnome.Maps", None, 5)));
    assert!(matches!(source.fetch_releases(&target("org.gnome.Maps", None, 5)).await, ProviderResult::Unavailable(_)));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort on Windows")]
async fn mozilla_missing_notes_page_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product-details/thunderbird_versions.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"LATEST_THUNDERBIRD_VERSION": "139.0.1"})))
        .mount(&server)
        .await;

    let source = mozilla(&server);
    let result = source.fetch_releases(&target("org.mozilla.Thunderbird", None, 5)).await;

    assert!(matches!(result, ProviderResult::NotFound));
}
