use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::source::{FetchError, ParsedFeed, ParsedItem};

/// Unprefixed RSS 2.0 elements ingestion reads. Prefixed siblings such as
/// `itunes:title` or `atom:link` never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

/// Text of each field; `None` until the element is first seen. Repeats are ignored.
#[derive(Debug, Default)]
struct Fields {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
}

impl Fields {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
        }
    }

    /// Start capturing `field` unless it was already captured.
    fn open(&mut self, field: Field) -> bool {
        let slot = self.slot(field);
        if slot.is_some() {
            return false;
        }
        *slot = Some(String::new());
        true
    }

    fn push(&mut self, field: Field, text: &str) {
        if let Some(value) = self.slot(field) {
            value.push_str(text);
        }
    }

    fn take(field: Option<String>) -> String {
        field.map(|v| v.trim().to_string()).unwrap_or_default()
    }
}

impl From<Fields> for ParsedItem {
    fn from(fields: Fields) -> Self {
        ParsedItem {
            title: Fields::take(fields.title),
            link: Fields::take(fields.link),
            description: Fields::take(fields.description),
            pub_date: Fields::take(fields.pub_date),
        }
    }
}

/// Parse a feed document.
///
/// RSS 2.0 is read with quick-xml's event reader so `pubDate` reaches the
/// worker verbatim. Everything else (Atom, RSS 1.0, JSON Feed) and any RSS
/// document that is not well-formed is handed to `feed-rs`, whose parsed
/// dates are rendered back to RFC 2822.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, FetchError> {
    if is_rss2(bytes) {
        match parse_rss2(bytes) {
            Ok(feed) => return Ok(feed),
            Err(e) => {
                tracing::debug!(error = %e, "Strict RSS 2.0 parse failed, falling back to feed-rs");
            }
        }
    }
    parse_generic(bytes)
}

/// True if the document's root element is `<rss>`
fn is_rss2(bytes: &[u8]) -> bool {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return e.name().as_ref() == b"rss";
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
        buf.clear();
    }
}

/// Where captured text goes
#[derive(Debug, Clone, Copy)]
enum Target {
    Channel(Field),
    Item(Field),
}

fn parse_error(e: impl std::fmt::Display) -> FetchError {
    FetchError::Parse(e.to_string())
}

/// Walk an `<rss>` document matching full element names:
/// `rss/channel/{title,description}` and `rss/channel/item/{title,link,description,pubDate}`.
/// Anything else, including elements between items, is skipped.
fn parse_rss2(bytes: &[u8]) -> Result<ParsedFeed, FetchError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    // Element names from the root down to the current element
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut channel = Fields::default();
    let mut saw_channel = false;
    let mut item: Option<Fields> = None;
    let mut items = Vec::new();
    // Capture target and the depth of the element that opened it
    let mut target: Option<(Target, usize)> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(parse_error)? {
            Event::Start(e) => {
                path.push(e.name().as_ref().to_vec());
                if target.is_none() {
                    target = open_target(&path, &e, &mut channel, &mut item, &mut saw_channel);
                }
            }
            Event::Empty(e) => {
                // <item/> still counts as an item
                if path.len() == 2 && path[1] == b"channel" && e.name().as_ref() == b"item" {
                    items.push(ParsedItem::default());
                }
            }
            Event::Text(e) => {
                if let Some((t, _)) = target {
                    let text = e.unescape().map_err(parse_error)?;
                    capture(t, &text, &mut channel, &mut item);
                }
            }
            Event::CData(e) => {
                if let Some((t, _)) = target {
                    let text = String::from_utf8_lossy(&e);
                    capture(t, &text, &mut channel, &mut item);
                }
            }
            Event::End(e) => {
                let depth = path.len();
                if matches!(target, Some((_, d)) if d == depth) {
                    target = None;
                }
                if depth == 3 && path[1] == b"channel" && e.name().as_ref() == b"item" {
                    if let Some(done) = item.take() {
                        items.push(ParsedItem::from(done));
                    }
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(FetchError::Parse("unexpected end of document".to_string()));
    }
    if !saw_channel {
        return Err(FetchError::Parse("missing <channel>".to_string()));
    }

    Ok(ParsedFeed {
        title: Fields::take(channel.title),
        description: Fields::take(channel.description),
        items,
    })
}

/// Decide whether the element just pushed onto `path` starts a capture.
fn open_target(
    path: &[Vec<u8>],
    start: &BytesStart<'_>,
    channel: &mut Fields,
    item: &mut Option<Fields>,
    saw_channel: &mut bool,
) -> Option<(Target, usize)> {
    let depth = path.len();
    let name = start.name();
    let name = name.as_ref();
    match depth {
        2 => {
            if name == b"channel" {
                *saw_channel = true;
            }
            None
        }
        3 if path[1] == b"channel" => {
            if name == b"item" {
                *item = Some(Fields::default());
                return None;
            }
            match Field::from_name(name)? {
                field @ (Field::Title | Field::Description) if channel.open(field) => {
                    Some((Target::Channel(field), depth))
                }
                _ => None,
            }
        }
        4 if path[1] == b"channel" && path[2] == b"item" => {
            let field = Field::from_name(name)?;
            let fields = item.as_mut()?;
            fields.open(field).then_some((Target::Item(field), depth))
        }
        _ => None,
    }
}

fn capture(target: Target, text: &str, channel: &mut Fields, item: &mut Option<Fields>) {
    match target {
        Target::Channel(field) => channel.push(field, text),
        Target::Item(field) => {
            if let Some(fields) = item.as_mut() {
                fields.push(field, text);
            }
        }
    }
}

fn parse_generic(bytes: &[u8]) -> Result<ParsedFeed, FetchError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .unwrap_or_default();
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            let pub_date = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.to_rfc2822())
                .unwrap_or_default();

            ParsedItem {
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                link,
                description: description.trim().to_string(),
                pub_date,
            }
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content).unwrap_or_default(),
        description: feed.description.map(|d| d.content).unwrap_or_default(),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const RSS2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
<channel>
    <title>Lane's Blog</title>
    <link>https://wagslane.dev/</link>
    <description>Recent content</description>
    <item>
        <title>First &amp; Foremost</title>
        <link>https://wagslane.dev/posts/first/</link>
        <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
        <guid>https://wagslane.dev/posts/first/</guid>
        <description><![CDATA[<p>Hello</p>]]></description>
    </item>
    <item>
        <title>Second</title>
        <link>https://wagslane.dev/posts/second/</link>
        <pubDate>not a date</pubDate>
        <description></description>
    </item>
</channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Example</title>
    <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
    <updated>2003-12-13T18:30:02Z</updated>
    <entry>
        <title>Atom-Powered Robots Run Amok</title>
        <link href="http://example.org/2003/12/13/atom03"/>
        <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
        <updated>2003-12-13T18:30:02Z</updated>
        <summary>Some text.</summary>
    </entry>
</feed>"#;

    #[test]
    fn test_rss2_items_in_document_order() {
        let feed = parse_feed(RSS2.as_bytes()).unwrap();
        assert_eq!(feed.title, "Lane's Blog");
        assert_eq!(feed.description, "Recent content");
        assert_eq!(
            feed.items,
            vec![
                ParsedItem {
                    title: "First & Foremost".to_string(),
                    link: "https://wagslane.dev/posts/first/".to_string(),
                    description: "<p>Hello</p>".to_string(),
                    pub_date: "Mon, 02 Jan 2006 15:04:05 -0700".to_string(),
                },
                ParsedItem {
                    title: "Second".to_string(),
                    link: "https://wagslane.dev/posts/second/".to_string(),
                    description: String::new(),
                    pub_date: "not a date".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_rss2_keeps_unparseable_date_verbatim() {
        let feed = parse_feed(RSS2.as_bytes()).unwrap();
        assert_eq!(feed.items[1].pub_date, "not a date");
    }

    #[test]
    fn test_rss2_empty_channel() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.title, "Empty");
        assert!(feed.items.is_empty());
    }

    #[test]
    fn test_rss2_prefixed_siblings_do_not_shadow_fields() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"
     xmlns:atom="http://www.w3.org/2005/Atom"
     xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
     xmlns:media="http://search.yahoo.com/mrss/">
<channel>
    <title>Podcast</title>
    <itunes:title>Podcast (iTunes)</itunes:title>
    <atom:link href="https://pod.example.com/rss" rel="self"/>
    <item>
        <itunes:title>Episode 1 (iTunes)</itunes:title>
        <title>Episode 1</title>
        <media:title>Episode 1 (media)</media:title>
        <atom:link href="https://pod.example.com/alt/1"/>
        <link>https://pod.example.com/1</link>
        <pubDate>2024-01-01T00:00:00Z</pubDate>
    </item>
</channel>
</rss>"#;

        let feed = parse_rss2(xml.as_bytes()).unwrap();
        assert_eq!(feed.title, "Podcast");
        assert_eq!(
            feed.items,
            vec![ParsedItem {
                title: "Episode 1".to_string(),
                link: "https://pod.example.com/1".to_string(),
                description: String::new(),
                pub_date: "2024-01-01T00:00:00Z".to_string(),
            }]
        );
        // Same result through the public entry point, date untouched
        assert_eq!(parse_feed(xml.as_bytes()).unwrap(), feed);
    }

    #[test]
    fn test_rss2_items_split_by_other_channel_elements() {
        let xml = r#"<rss version="2.0"><channel>
    <title>Split</title>
    <item><title>A</title><link>https://e.com/a</link></item>
    <image><title>Logo</title><url>https://e.com/logo.png</url><link>https://e.com</link></image>
    <item><title>B</title><link>https://e.com/b</link></item>
    <category>misc</category>
    <item><title>C</title><link>https://e.com/c</link></item>
</channel></rss>"#;

        let feed = parse_rss2(xml.as_bytes()).unwrap();
        assert_eq!(feed.title, "Split");
        let links: Vec<&str> = feed.items.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, vec!["https://e.com/a", "https://e.com/b", "https://e.com/c"]);
    }

    #[test]
    fn test_rss2_repeated_element_keeps_first() {
        let xml = r#"<rss version="2.0"><channel>
    <item><title>First</title><title>Second</title><link>https://e.com/x</link></item>
</channel></rss>"#;
        let feed = parse_rss2(xml.as_bytes()).unwrap();
        assert_eq!(feed.items[0].title, "First");
    }

    #[test]
    fn test_rss2_without_channel_is_rejected() {
        assert!(matches!(
            parse_rss2(br#"<rss version="2.0"></rss>"#),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_atom_falls_back_to_feed_rs() {
        let feed = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(feed.title, "Atom Example");
        assert_eq!(feed.items.len(), 1);

        let item = &feed.items[0];
        assert_eq!(item.title, "Atom-Powered Robots Run Amok");
        assert_eq!(item.link, "http://example.org/2003/12/13/atom03");
        assert_eq!(item.description, "Some text.");
        assert!(chrono::DateTime::parse_from_rfc2822(&item.pub_date).is_ok());
    }

    #[test]
    fn test_root_detection() {
        assert!(is_rss2(RSS2.as_bytes()));
        assert!(!is_rss2(ATOM.as_bytes()));
        assert!(!is_rss2(b"{\"version\": \"https://jsonfeed.org/version/1\"}"));
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        match parse_feed(b"<not valid xml") {
            Err(FetchError::Parse(_)) => {}
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_html_page_is_parse_error() {
        let html = b"<!DOCTYPE html><html><body><h1>Not a feed</h1></body></html>";
        assert!(matches!(parse_feed(html), Err(FetchError::Parse(_))));
    }

    proptest! {
        #[test]
        fn parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = parse_feed(&bytes);
        }

        #[test]
        fn rss2_titles_survive(title in "[A-Za-z0-9 ]{1,40}") {
            let xml = format!(
                r#"<rss version="2.0"><channel><item><title>{title}</title><link>https://e.com/a</link></item></channel></rss>"#
            );
            let feed = parse_feed(xml.as_bytes()).unwrap();
            prop_assert_eq!(feed.items.len(), 1);
            prop_assert_eq!(&feed.items[0].title, title.trim());
        }
    }
}
