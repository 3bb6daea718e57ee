mod support;

use std::sync::Arc;

use harvest_core::{
    refresh_channels, refresh_matches, ApiCatalog, ApiCategory, ChannelSlots, ChannelsPlan,
    InteractionDriver, ListingCatalog, ListingSection, MatchesPlan, Quiet, RunError, SniffRule,
    StreamResolver,
};
use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{fast_driver, ScriptedRenderer, SetProber};

const EPG: &str = "https://epg.example/guide.xml";

const EXISTING: &str = r#"#EXTM3U
#EXTM3U url-tvg="https://old.example/epg"
#EXTINF:-1 group-title="TV",ESPN
http://old/espn
#EXTINF:-1 group-title="NBA",Old Game
http://old/game
#EXTINF:-1 group-title="TV",CNN
#EXTVLCOPT:http-user-agent=Mozilla/5.0
http://old/cnn
#EXTINF:-1 group-title="Radio",Jazz
http://radio/jazz
"#;

async fn mount_html(server: &MockServer, p: &str, anchors: &[(&str, &str)]) {
    let items: String = anchors
        .iter()
        .map(|(href, title)| format!("<li><a href=\"{href}\">{title}</a></li>"))
        .collect();
    let body = format!("<html><body><ol class=\"list-group\">{items}</ol></body></html>");
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_json(server: &MockServer, p: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn ping(manifest: &str) -> String {
    format!("https://tv.example/ping.gif?mu={}", urlencode(manifest))
}

fn urlencode(s: &str) -> String {
    s.replace(':', "%3A").replace('/', "%2F")
}

fn sections() -> Vec<ListingSection> {
    vec![
        ListingSection::new("/nba", "NBA"),
        ListingSection::new("/mlb", "MLB")
            .with_metadata("MLB.Baseball.Dummy.us", "http://logos/Baseball-2.png"),
    ]
}

fn plan(playlist: std::path::PathBuf) -> ChannelsPlan {
    ChannelsPlan {
        playlist,
        epg_url: EPG.into(),
        channel_groups: vec!["TV".into()],
        slots: ChannelSlots::First,
        section_groups: sections().into_iter().map(|s| s.group).collect(),
    }
}

fn resolvers(
    server: &MockServer,
    renderer: ScriptedRenderer,
    prober: SetProber,
) -> (StreamResolver, StreamResolver) {
    let renderer = Arc::new(renderer);
    let prober = Arc::new(prober);
    let channel_catalog = Arc::new(ListingCatalog::new(
        Client::new(),
        server.uri(),
        vec![ListingSection::new("/tv", "TV")],
    ));
    let section_catalog = Arc::new(ListingCatalog::new(Client::new(), server.uri(), sections()));

    let channels = StreamResolver::new(
        channel_catalog,
        InteractionDriver::new(renderer.clone(), SniffRule::ping_rules(), fast_driver()),
        prober.clone(),
        2,
    );
    let sections = StreamResolver::new(
        section_catalog,
        InteractionDriver::new(renderer, SniffRule::ping_rules(), fast_driver()),
        prober,
        2,
    );
    (channels, sections)
}

#[tokio::test]
async fn channel_refresh_replaces_in_place_and_rebuilds_sections() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(&server, "/tv", &[("/tv/espn", "ESPN"), ("/tv/cnn", "CNN")]).await;
    mount_html(&server, "/nba", &[("/event/game1", "Lakers @ Celtics")]).await;
    mount_html(&server, "/mlb", &[("/event/nyy", "Yankees @ Red Sox")]).await;

    let renderer = ScriptedRenderer::default()
        .trigger(&format!("{base}/tv/espn"), "Load SD Stream", &ping("https://cdn.example/espn.m3u8"))
        .trigger(&format!("{base}/tv/cnn"), "Load HD Stream", &ping("https://cdn.example/cnn.m3u8"))
        .trigger(&format!("{base}/event/game1"), "Load SD Stream", "https://cdn.example/game1.m3u8")
        .trigger(&format!("{base}/event/nyy"), "Load SD Stream", "https://cdn.example/nyy.m3u8");
    let prober = SetProber::live(&[
        "https://cdn.example/espn.m3u8",
        "https://cdn.example/cnn.m3u8",
        "https://cdn.example/game1.m3u8",
        "https://cdn.example/nyy.m3u8",
    ]);
    let (channels, sections) = resolvers(&server, renderer, prober);

    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("TheTVApp.m3u8");
    std::fs::write(&playlist, EXISTING).unwrap();

    let report = refresh_channels(&channels, &sections, &plan(playlist.clone()), &mut Quiet)
        .await
        .unwrap();

    let expected = format!(
        r#"#EXTM3U url-tvg="{EPG}"
#EXTINF:-1 group-title="TV",ESPN
https://cdn.example/espn.m3u8
#EXTINF:-1 group-title="TV",CNN
#EXTVLCOPT:http-user-agent=Mozilla/5.0
https://cdn.example/cnn.m3u8
#EXTINF:-1 group-title="Radio",Jazz
http://radio/jazz
#EXTINF:-1 group-title="NBA",Lakers @ Celtics
https://cdn.example/game1.m3u8
#EXTINF:-1 tvg-id="MLB.Baseball.Dummy.us" tvg-name="Yankees @ Red Sox" tvg-logo="http://logos/Baseball-2.png" group-title="MLB",Yankees @ Red Sox
https://cdn.example/nyy.m3u8
"#
    );
    assert_eq!(std::fs::read_to_string(&playlist).unwrap(), expected);

    assert_eq!(report.entries_replaced, 2);
    assert_eq!(report.entries_pruned, 1);
    assert_eq!(report.entries_written, 5);
    assert_eq!(report.phases.len(), 2);
    assert_eq!(report.phases[0].phase, "channels");
    assert_eq!(report.phases[1].resolved, 2);
}

#[tokio::test]
async fn per_tier_channels_fill_their_sd_and_hd_entries() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(&server, "/tv", &[("/tv/espn", "ESPN"), ("/tv/cnn", "CNN")]).await;
    mount_html(&server, "/nba", &[]).await;
    mount_html(&server, "/mlb", &[]).await;

    let mut renderer = ScriptedRenderer::default();
    let mut live = Vec::new();
    for channel in ["espn", "cnn"] {
        for tier in ["SD", "HD"] {
            let manifest = format!("https://cdn.example/{channel}-{}.m3u8", tier.to_lowercase());
            renderer = renderer.trigger(
                &format!("{base}/tv/{channel}"),
                &format!("Load {tier} Stream"),
                &ping(&manifest),
            );
            live.push(manifest);
        }
    }
    let live_refs: Vec<&str> = live.iter().map(String::as_str).collect();
    let (channels, sections) = resolvers(&server, renderer, SetProber::live(&live_refs));

    let existing = r#"#EXTM3U
#EXTINF:-1 group-title="TV",ESPN SD
http://old/1
#EXTINF:-1 group-title="TV",ESPN HD
http://old/2
#EXTINF:-1 group-title="TV",CNN SD
http://old/3
#EXTINF:-1 group-title="TV",CNN HD
http://old/4
"#;
    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("TheTVApp.m3u8");
    std::fs::write(&playlist, existing).unwrap();

    let tiered = ChannelsPlan {
        slots: ChannelSlots::PerTier,
        ..plan(playlist.clone())
    };
    let report = refresh_channels(&channels, &sections, &tiered, &mut Quiet).await.unwrap();

    let expected = format!(
        r#"#EXTM3U url-tvg="{EPG}"
#EXTINF:-1 group-title="TV",ESPN SD
https://cdn.example/espn-sd.m3u8
#EXTINF:-1 group-title="TV",ESPN HD
https://cdn.example/espn-hd.m3u8
#EXTINF:-1 group-title="TV",CNN SD
https://cdn.example/cnn-sd.m3u8
#EXTINF:-1 group-title="TV",CNN HD
https://cdn.example/cnn-hd.m3u8
"#
    );
    assert_eq!(std::fs::read_to_string(&playlist).unwrap(), expected);
    assert_eq!(report.entries_replaced, 4);
    assert_eq!(report.phases[0].resolved, 2);
}

#[tokio::test]
async fn failed_channel_keeps_its_old_url_and_position() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(
        &server,
        "/tv",
        &[("/tv/espn", "ESPN"), ("/tv/cnn", "CNN"), ("/tv/fox", "FOX")],
    )
    .await;
    mount_html(&server, "/nba", &[]).await;
    mount_html(&server, "/mlb", &[]).await;

    let renderer = ScriptedRenderer::default()
        .trigger(&format!("{base}/tv/espn"), "Load SD Stream", "https://cdn.example/espn.m3u8")
        .trigger(&format!("{base}/tv/cnn"), "Load SD Stream", "https://cdn.example/cnn.m3u8")
        .trigger(&format!("{base}/tv/fox"), "Load SD Stream", "https://cdn.example/fox.m3u8");
    let prober = SetProber::live(&["https://cdn.example/espn.m3u8", "https://cdn.example/fox.m3u8"]);
    let (channels, sections) = resolvers(&server, renderer, prober);

    let existing = r#"#EXTM3U
#EXTINF:-1 group-title="TV",ESPN
http://old/espn
#EXTINF:-1 group-title="TV",CNN
http://old/cnn
#EXTINF:-1 group-title="TV",FOX
http://old/fox
"#;
    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("TheTVApp.m3u8");
    std::fs::write(&playlist, existing).unwrap();

    let report = refresh_channels(&channels, &sections, &plan(playlist.clone()), &mut Quiet)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&playlist).unwrap();
    let urls: Vec<&str> = written.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(
        urls,
        vec!["https://cdn.example/espn.m3u8", "http://old/cnn", "https://cdn.example/fox.m3u8"]
    );
    assert_eq!(report.entries_replaced, 2);
    assert_eq!(report.phases[0].unavailable, 1);
}

#[tokio::test]
async fn second_refresh_does_not_duplicate_sections() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(&server, "/tv", &[("/tv/espn", "ESPN")]).await;
    mount_html(&server, "/nba", &[("/event/game1", "Lakers @ Celtics")]).await;
    mount_html(&server, "/mlb", &[]).await;

    let renderer = ScriptedRenderer::default()
        .trigger(&format!("{base}/tv/espn"), "Load SD Stream", "https://cdn.example/espn.m3u8")
        .trigger(&format!("{base}/event/game1"), "Load SD Stream", "https://cdn.example/game1.m3u8");
    let prober = SetProber::live(&["https://cdn.example/espn.m3u8", "https://cdn.example/game1.m3u8"]);
    let (channels, sections) = resolvers(&server, renderer, prober);

    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("TheTVApp.m3u8");
    std::fs::write(&playlist, EXISTING).unwrap();

    refresh_channels(&channels, &sections, &plan(playlist.clone()), &mut Quiet).await.unwrap();
    let first = std::fs::read_to_string(&playlist).unwrap();
    refresh_channels(&channels, &sections, &plan(playlist.clone()), &mut Quiet).await.unwrap();
    let second = std::fs::read_to_string(&playlist).unwrap();

    assert_eq!(first, second);
    assert_eq!(second.matches("group-title=\"NBA\"").count(), 1);
    assert_eq!(second.matches("#EXTM3U").count(), 1);
}

#[tokio::test]
async fn missing_playlist_aborts_without_writing() {
    let server = MockServer::start().await;
    let (channels, sections) = resolvers(&server, ScriptedRenderer::default(), SetProber::default());

    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("absent.m3u8");
    let err = refresh_channels(&channels, &sections, &plan(playlist.clone()), &mut Quiet)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::MissingPlaylist(ref p) if p == &playlist));
    assert!(!playlist.exists());
}

#[tokio::test]
async fn no_channel_urls_leaves_file_untouched() {
    let server = MockServer::start().await;
    mount_html(&server, "/tv", &[("/tv/espn", "ESPN")]).await;
    let (channels, sections) = resolvers(&server, ScriptedRenderer::default(), SetProber::default());

    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("TheTVApp.m3u8");
    std::fs::write(&playlist, EXISTING).unwrap();

    let err = refresh_channels(&channels, &sections, &plan(playlist.clone()), &mut Quiet)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::NothingResolved(_)));
    assert_eq!(std::fs::read_to_string(&playlist).unwrap(), EXISTING);
}

#[tokio::test]
async fn empty_sections_still_prune_old_entries() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(&server, "/tv", &[("/tv/espn", "ESPN")]).await;
    mount_html(&server, "/nba", &[("/event/game1", "Lakers @ Celtics")]).await;
    mount_html(&server, "/mlb", &[]).await;

    let renderer = ScriptedRenderer::default()
        .trigger(&format!("{base}/tv/espn"), "Load SD Stream", "https://cdn.example/espn.m3u8");
    let prober = SetProber::live(&["https://cdn.example/espn.m3u8"]);
    let (channels, sections) = resolvers(&server, renderer, prober);

    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("TheTVApp.m3u8");
    std::fs::write(&playlist, EXISTING).unwrap();

    let report = refresh_channels(&channels, &sections, &plan(playlist.clone()), &mut Quiet)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&playlist).unwrap();
    assert!(!written.contains("group-title=\"NBA\""));
    assert!(written.contains("http://old/cnn"));
    assert_eq!(report.phases[1].unavailable, 1);
    assert_eq!(report.entries_written, 3);
}

#[tokio::test]
async fn matches_run_rebuilds_from_api() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_json(
        &server,
        "/api/sports",
        json!([{"id": "basketball", "name": "Basketball"}, {"id": "cricket", "name": "Cricket"}]),
    )
    .await;
    mount_json(
        &server,
        "/api/matches/basketball",
        json!([
            {
                "id": "m1",
                "title": "Lakers vs Celtics",
                "date": 1700000000000i64,
                "teams": {"home": {"badge": "lal"}},
                "sources": [{"source": "alpha", "id": "lc"}]
            },
            {"id": "m2", "title": "Bulls vs Heat", "sources": [{"source": "bravo", "id": "bh"}]},
            {"id": "m3", "title": "No Sources", "sources": []}
        ]),
    )
    .await;
    mount_json(
        &server,
        "/api/stream/alpha/lc",
        json!([{"embedUrl": "https://embed.a/lc", "language": "English", "hd": true}]),
    )
    .await;
    mount_json(
        &server,
        "/api/stream/bravo/bh",
        json!([{"embedUrl": "https://embed.b/bh", "language": "", "hd": false}]),
    )
    .await;

    let renderer = ScriptedRenderer::default()
        .load("https://embed.a/lc", "https://cdn.example/lc.m3u8")
        .load("https://embed.b/bh", "https://cdn.example/bh.m3u8");
    let prober = SetProber::live(&["https://cdn.example/lc.m3u8"]);

    let catalog = ApiCatalog::new(
        Client::new(),
        base.clone(),
        "StreamedSU",
        vec![ApiCategory::new("Basketball", "Basketball.Dummy.us", "http://logos/Basketball.png")],
    );
    let resolver = StreamResolver::new(
        Arc::new(catalog),
        InteractionDriver::new(Arc::new(renderer), SniffRule::direct_rules(), fast_driver()),
        Arc::new(prober),
        2,
    );

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("StreamedSU.m3u8");
    std::fs::write(&output, "#EXTM3U\n#EXTINF:-1 group-title=\"Stale\",Old\nhttp://old\n").unwrap();

    let plan = MatchesPlan {
        output: output.clone(),
        epg_url: None,
    };
    let report = refresh_matches(&resolver, &plan, &mut Quiet).await.unwrap();

    let expected = format!(
        "#EXTM3U\n#EXTINF:-1 tvg-id=\"Basketball.Dummy.us\" tvg-logo=\"{base}/api/images/badge/lal.webp\" group-title=\"StreamedSU - Basketball\",Lakers vs Celtics (English - HD)\nhttps://cdn.example/lc.m3u8\n"
    );
    assert_eq!(std::fs::read_to_string(&output).unwrap(), expected);
    assert_eq!(report.phases[0].items_seen, 2);
    assert_eq!(report.resolved(), 1);
    assert_eq!(report.unavailable(), 1);
}

#[tokio::test]
async fn matches_run_fails_when_catalog_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sports"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let catalog = ApiCatalog::new(Client::new(), server.uri(), "StreamedSU", vec![]);
    let resolver = StreamResolver::new(
        Arc::new(catalog),
        InteractionDriver::new(
            Arc::new(ScriptedRenderer::default()),
            SniffRule::direct_rules(),
            fast_driver(),
        ),
        Arc::new(SetProber::default()),
        1,
    );

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("StreamedSU.m3u8");
    let plan = MatchesPlan {
        output: output.clone(),
        epg_url: Some(EPG.into()),
    };

    let err = refresh_matches(&resolver, &plan, &mut Quiet).await.unwrap_err();
    assert!(matches!(err, RunError::Catalog(_)));
    assert!(!output.exists());
}
