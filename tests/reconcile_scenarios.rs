use chrono::NaiveDate;
use epg_merger::ingestor::{AliasFixups, GuideElement, M3uParser, Reconciler, XmltvReader};
use epg_merger::models::{PlaylistEntry, ReconciliationDiagnostics, ReferenceDates};
use epg_merger::proxy::ProxyGenerator;

fn dates() -> ReferenceDates {
    ReferenceDates::new(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
}

fn playlist(names: &[&str]) -> Vec<PlaylistEntry> {
    let mut text = String::from("#EXTM3U\n");
    for (i, name) in names.iter().enumerate() {
        text.push_str(&format!(
            "#EXTINF:-1 group-title=\"General\",{}\nhttp://stream/{}\n",
            name, i
        ));
    }
    M3uParser::parse_str(&text).unwrap()
}

fn channel_xml(id: &str, aliases: &[&str]) -> String {
    let mut xml = format!("<channel id=\"{}\">", id);
    for alias in aliases {
        xml.push_str(&format!("<display-name>{}</display-name>", alias));
    }
    xml.push_str("</channel>\n");
    xml
}

/// `count` one-hour programmes on 2024-03-10
fn programmes_xml(channel: &str, count: u32) -> String {
    (0..count)
        .map(|hour| {
            format!(
                "<programme start=\"20240310{:02}0000 +0000\" stop=\"20240310{:02}0000 +0000\" channel=\"{}\"><title>Show {}</title></programme>\n",
                hour,
                hour + 1,
                channel,
                hour
            )
        })
        .collect()
}

fn feed(body: &str) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<tv>\n{}</tv>\n", body)
}

fn run(entries: &mut [PlaylistEntry], feeds: &[String]) -> ReconciliationDiagnostics {
    let fixups = AliasFixups::default();
    let mut reconciler = Reconciler::new(entries, dates(), &fixups);
    for (i, document) in feeds.iter().enumerate() {
        reconciler
            .process_feed(&format!("feed-{}", i + 1), document.as_bytes())
            .unwrap();
    }
    reconciler.finish()
}

fn render_guide(entries: &[PlaylistEntry], diagnostics: &mut ReconciliationDiagnostics) -> String {
    let mut out = Vec::new();
    ProxyGenerator::new("localhost:8080")
        .write_guide(entries, diagnostics, &mut out)
        .unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_orig_suffix_propagates_to_later_feed() {
    let mut entries = playlist(&["Channel One orig"]);
    let feeds = vec![
        feed(&channel_xml("c1", &["Channel One"])),
        feed(&channel_xml("c1-alt", &["Channel One orig"])),
    ];
    let diagnostics = run(&mut entries, &feeds);

    let entry = &entries[0];
    assert_eq!(entry.channels().len(), 2);
    let first = entry.channels().values().next().unwrap().borrow();
    let texts: Vec<&str> = first.aliases.iter().map(|a| a.text()).collect();
    assert_eq!(texts, vec!["Channel One", "Channel One orig"]);
    assert_eq!(diagnostics.channels_matched, 2);
}

#[test]
fn test_plain_names_only_match_exactly() {
    let mut entries = playlist(&["News 24"]);
    let feeds = vec![feed(&format!(
        "{}{}",
        channel_xml("n1", &["NEWS 24"]),
        channel_xml("n2", &["News"])
    ))];
    run(&mut entries, &feeds);

    let ids: Vec<String> = entries[0].channels().keys().map(|k| k.id.clone()).collect();
    assert_eq!(ids, vec!["n1"]);
    assert!(entries[0].learned_aliases().is_empty());
}

#[test]
fn test_feed_order_changes_result() {
    let first = feed(&channel_xml("a", &["Channel One", "Pervy"]));
    let second = feed(&channel_xml("b", &["Pervy"]));

    let mut forward = playlist(&["Channel One orig"]);
    run(&mut forward, &[first.clone(), second.clone()]);
    assert_eq!(forward[0].channels().len(), 2);

    let mut reversed = playlist(&["Channel One orig"]);
    run(&mut reversed, &[second, first]);
    assert_eq!(reversed[0].channels().len(), 1);
}

#[test]
fn test_best_source_has_most_current_programmes() {
    for (small_first, expected) in [(true, "big"), (false, "big")] {
        let small = feed(&format!("{}{}", channel_xml("small", &["Sport"]), programmes_xml("small", 3)));
        let big = feed(&format!("{}{}", channel_xml("big", &["Sport"]), programmes_xml("big", 7)));
        let feeds = if small_first { vec![small, big] } else { vec![big, small] };

        let mut entries = playlist(&["Sport"]);
        run(&mut entries, &feeds);

        assert_eq!(entries[0].effective_id().as_deref(), Some(expected));
    }
}

#[test]
fn test_tie_goes_to_channel_declared_first() {
    let body = format!(
        "{}{}{}{}",
        "<channel id=\"zeta\"><display-name>Sport</display-name><icon src=\"http://zeta.png\"/></channel>\n",
        "<channel id=\"alpha\"><display-name>Sport</display-name><icon src=\"http://alpha.png\"/></channel>\n",
        programmes_xml("zeta", 1),
        programmes_xml("alpha", 1)
    );
    let mut entries = playlist(&["Sport"]);
    run(&mut entries, &[feed(&body)]);

    assert_eq!(entries[0].effective_id().as_deref(), Some("zeta"));
    assert_eq!(entries[0].effective_logo().as_deref(), Some("http://zeta.png"));
}

#[test]
fn test_full_hd_entry_learns_hd_listing() {
    let first = feed(&format!(
        "{}{}",
        channel_xml("sport-hd", &["Sport HD"]),
        programmes_xml("sport-hd", 2)
    ));
    let second = feed(&channel_xml("sport-fhd", &["Sport FHD"]));

    let mut entries = playlist(&["Sport FHD"]);
    let mut diagnostics = run(&mut entries, &[first, second]);
    assert_eq!(entries[0].channels().len(), 2);
    assert_eq!(entries[0].effective_id().as_deref(), Some("sport-hd"));

    let guide = render_guide(&entries, &mut diagnostics);
    assert!(guide.contains("<display-name>Sport HD</display-name>"));
    assert!(guide.contains("<display-name>Sport FHD</display-name>"));
}

#[test]
fn test_pruning_window() {
    let body = format!(
        "{}{}",
        channel_xml("p", &["Window"]),
        [
            ("20240309100000 +0000", "20240309110000 +0000", "Yesterday"),
            ("20240310100000 +0000", "20240310110000 +0000", "Today"),
            ("20240317230000 +0000", "20240318010000 +0000", "Last day"),
            ("20240318100000 +0000", "20240318110000 +0000", "Too far"),
            ("garbage", "20240310110000 +0000", "Undated"),
        ]
        .iter()
        .map(|(start, stop, title)| format!(
            "<programme start=\"{}\" stop=\"{}\" channel=\"p\"><title>{}</title></programme>\n",
            start, stop, title
        ))
        .collect::<String>()
    );

    let mut entries = playlist(&["Window"]);
    let mut diagnostics = run(&mut entries, &[feed(&body)]);
    let guide = render_guide(&entries, &mut diagnostics);

    for kept in ["Today", "Last day", "Undated"] {
        assert!(guide.contains(kept), "{} should be kept", kept);
    }
    for pruned in ["Yesterday", "Too far"] {
        assert!(!guide.contains(pruned), "{} should be pruned", pruned);
    }
    assert_eq!(diagnostics.past_pruned, 1);
    assert_eq!(diagnostics.horizon_pruned, 1);
    assert_eq!(diagnostics.programmes_written, 3);
}

#[test]
fn test_escaped_title_round_trips() {
    let body = format!(
        "{}<programme start=\"20240310100000 +0000\" stop=\"20240310110000 +0000\" channel=\"e\"><title>Q&amp;A &lt;live&gt; &quot;now&quot; &apos;here&apos;</title></programme>\n",
        channel_xml("e", &["Escapes"])
    );
    let mut entries = playlist(&["Escapes"]);
    let mut diagnostics = run(&mut entries, &[feed(&body)]);
    let guide = render_guide(&entries, &mut diagnostics);

    let fixups = AliasFixups::default();
    let mut reader = XmltvReader::new(guide.as_bytes(), 0, dates(), &fixups);
    let mut titles = Vec::new();
    while let Some(element) = reader.next_element().unwrap() {
        if let GuideElement::Programme(programme) = element {
            titles.extend(programme.titles.iter().map(|t| t.text().to_string()));
        }
    }
    assert_eq!(titles, vec![r#"Q&A <live> "now" 'here'"#]);
}

#[test]
fn test_empty_group_is_excluded_from_outputs() {
    let text = "#EXTM3U\n\
        #EXTINF:-1 group-title=\"\",Hidden\n\
        http://stream/hidden\n\
        #EXTINF:-1 group-title=\"Shown\",Visible\n\
        http://stream/visible\n";
    let mut entries = M3uParser::parse_str(text).unwrap();
    let feeds = vec![feed(&format!(
        "{}{}{}",
        channel_xml("h", &["Hidden"]),
        channel_xml("v", &["Visible"]),
        programmes_xml("h", 2)
    ))];
    let mut diagnostics = run(&mut entries, &feeds);

    let mut playlist_out = Vec::new();
    ProxyGenerator::new("localhost")
        .write_playlist(&entries, &mut playlist_out)
        .unwrap();
    let playlist_text = String::from_utf8(playlist_out).unwrap();
    assert!(playlist_text.contains("Visible"));
    assert!(!playlist_text.contains("Hidden"));

    let guide = render_guide(&entries, &mut diagnostics);
    assert!(guide.contains("<channel id=\"v\">"));
    assert!(!guide.contains("<channel id=\"h\">"));
    assert_eq!(diagnostics.programmes_written, 0);
}
