//! Streaming XMLTV reader
//!
//! Yields one `<channel>` or `<programme>` at a time using quick-xml's pull
//! parser, so memory stays bounded by the largest single element no matter
//! how big the feed is. Each decoded element is owned by the caller, which
//! decides whether to keep it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use quick_xml::events::{attributes::Attribute, BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use super::alias_fixups::AliasFixups;
use crate::errors::DecodeError;
use crate::models::{GuideChannel, NameValue, Programme, ReferenceDates};
use crate::utils::datetime::DateTimeParser;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A top-level element of a guide document
#[derive(Debug)]
pub enum GuideElement {
    Channel(GuideChannel),
    Programme(Programme),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagName {
    Tv,
    Channel,
    Programme,
    DisplayName,
    Icon,
    Title,
    Desc,
    Category,
    Other,
}

impl TagName {
    fn from_bytes(name: &[u8]) -> Self {
        match name {
            b"tv" => Self::Tv,
            b"channel" => Self::Channel,
            b"programme" => Self::Programme,
            b"display-name" => Self::DisplayName,
            b"icon" => Self::Icon,
            b"title" => Self::Title,
            b"desc" => Self::Desc,
            b"category" => Self::Category,
            _ => Self::Other,
        }
    }
}

/// Start tag detached from the read buffer
#[derive(Debug)]
struct OwnedTag {
    name: TagName,
    attributes: Vec<(String, String)>,
    position: u64,
}

impl OwnedTag {
    fn from_start(start: &BytesStart<'_>, position: u64) -> Self {
        let name = TagName::from_bytes(start.name().as_ref());
        let attributes = match name {
            TagName::Other | TagName::Tv => Vec::new(),
            _ => start
                .attributes()
                .flatten()
                .map(|attr| {
                    (
                        String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                        attribute_value(&attr),
                    )
                })
                .collect(),
        };
        Self {
            name,
            attributes,
            position,
        }
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, element: &'static str, key: &'static str) -> Result<String, DecodeError> {
        self.attribute(key)
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .ok_or(DecodeError::MissingAttribute {
                element,
                attribute: key,
                position: self.position,
            })
    }
}

/// One pull-parser event, owning everything the decoders need from it
enum Step {
    Open { tag: OwnedTag, empty: bool },
    Close,
    Text(String),
    Eof,
    Other,
}

/// Pull reader over one guide document
pub struct XmltvReader<'a, R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    feed: usize,
    dates: ReferenceDates,
    fixups: &'a AliasFixups,
}

impl<'a> XmltvReader<'a, BufReader<File>> {
    pub fn from_file(
        path: &Path,
        feed: usize,
        dates: ReferenceDates,
        fixups: &'a AliasFixups,
    ) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(
            BufReader::with_capacity(READ_BUFFER_SIZE, file),
            feed,
            dates,
            fixups,
        ))
    }
}

impl<'a, R: BufRead> XmltvReader<'a, R> {
    pub fn new(source: R, feed: usize, dates: ReferenceDates, fixups: &'a AliasFixups) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::with_capacity(4096),
            feed,
            dates,
            fixups,
        }
    }

    /// Next channel or programme, or `None` at the end of the document
    pub fn next_element(&mut self) -> Result<Option<GuideElement>, DecodeError> {
        loop {
            match self.next_step()? {
                Step::Open { tag, empty } => match tag.name {
                    TagName::Tv => {}
                    TagName::Channel => {
                        let channel = self.decode_channel(tag, empty)?;
                        return Ok(Some(GuideElement::Channel(channel)));
                    }
                    TagName::Programme => {
                        let programme = self.decode_programme(tag, empty)?;
                        return Ok(Some(GuideElement::Programme(programme)));
                    }
                    _ if !empty => self.skip_element("tv")?,
                    _ => {}
                },
                Step::Eof => return Ok(None),
                Step::Close | Step::Text(_) | Step::Other => {}
            }
        }
    }

    fn decode_channel(&mut self, tag: OwnedTag, empty: bool) -> Result<GuideChannel, DecodeError> {
        let id = tag
            .attribute("id")
            .filter(|id| !id.trim().is_empty())
            .ok_or(DecodeError::MissingChannelId {
                position: tag.position,
            })?;
        let mut channel = GuideChannel::new(id, self.feed);

        if !empty {
            loop {
                match self.next_step()? {
                    Step::Open { tag: child, empty } => match child.name {
                        TagName::DisplayName if !empty => {
                            let lang = child.attribute("lang").map(str::to_string);
                            let text = self.read_text("display-name")?;
                            if !text.is_empty() {
                                channel.aliases.push(NameValue::with_lang(text, lang));
                            }
                        }
                        TagName::Icon => {
                            if let Some(src) = child.attribute("src").filter(|s| !s.is_empty()) {
                                channel.icon_url = Some(src.to_string());
                            }
                            if !empty {
                                self.skip_element("icon")?;
                            }
                        }
                        _ if !empty => self.skip_element("channel")?,
                        _ => {}
                    },
                    Step::Close => break,
                    Step::Eof => return Err(DecodeError::UnexpectedEof { element: "channel" }),
                    Step::Text(_) | Step::Other => {}
                }
            }
        }

        self.fixups.apply(&mut channel);
        Ok(channel)
    }

    fn decode_programme(&mut self, tag: OwnedTag, empty: bool) -> Result<Programme, DecodeError> {
        let start = tag.required("programme", "start")?;
        let stop = tag.required("programme", "stop")?;
        let channel = tag.required("programme", "channel")?;
        let mut programme = Programme::new(channel, start, stop);

        if !empty {
            loop {
                match self.next_step()? {
                    Step::Open { tag: child, empty } => {
                        if empty {
                            continue;
                        }
                        let target = match child.name {
                            TagName::Title => &mut programme.titles,
                            TagName::Desc => &mut programme.descriptions,
                            TagName::Category => &mut programme.categories,
                            _ => {
                                self.skip_element("programme")?;
                                continue;
                            }
                        };
                        let lang = child.attribute("lang").map(str::to_string);
                        let text = self.read_text("programme")?;
                        if !text.is_empty() {
                            target.push(NameValue::with_lang(text, lang));
                        }
                    }
                    Step::Close => break,
                    Step::Eof => return Err(DecodeError::UnexpectedEof { element: "programme" }),
                    Step::Text(_) | Step::Other => {}
                }
            }
        }

        programme.start_date = parse_date(&programme.start, "start", &programme.channel);
        programme.stop_date = parse_date(&programme.stop, "stop", &programme.channel);
        programme.classify(&self.dates);
        Ok(programme)
    }

    /// Collects the text of the element just opened, up to its end tag
    fn read_text(&mut self, element: &'static str) -> Result<String, DecodeError> {
        let mut text = String::new();
        loop {
            match self.next_step()? {
                Step::Text(chunk) => text.push_str(&chunk),
                Step::Open { empty: false, .. } => self.skip_element(element)?,
                Step::Close => return Ok(text.trim().to_string()),
                Step::Eof => return Err(DecodeError::UnexpectedEof { element }),
                Step::Open { .. } | Step::Other => {}
            }
        }
    }

    /// Discards the element just opened, including all of its children
    fn skip_element(&mut self, element: &'static str) -> Result<(), DecodeError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next_step()? {
                Step::Open { empty: false, .. } => depth += 1,
                Step::Close => depth -= 1,
                Step::Eof => return Err(DecodeError::UnexpectedEof { element }),
                _ => {}
            }
        }
        Ok(())
    }

    fn next_step(&mut self) -> Result<Step, DecodeError> {
        self.buf.clear();
        let position = self.reader.buffer_position() as u64;
        let event = match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => event,
            Err(source) => {
                return Err(DecodeError::Xml {
                    position: self.reader.buffer_position() as u64,
                    source,
                })
            }
        };

        let step = match event {
            Event::Start(start) => Step::Open {
                tag: OwnedTag::from_start(&start, position),
                empty: false,
            },
            Event::Empty(start) => Step::Open {
                tag: OwnedTag::from_start(&start, position),
                empty: true,
            },
            Event::End(_) => Step::Close,
            Event::Text(text) => Step::Text(match text.unescape() {
                Ok(unescaped) => unescaped.into_owned(),
                Err(_) => String::from_utf8_lossy(&text).into_owned(),
            }),
            Event::CData(data) => Step::Text(String::from_utf8_lossy(&data).into_owned()),
            Event::Eof => Step::Eof,
            _ => Step::Other,
        };
        Ok(step)
    }
}

fn attribute_value(attr: &Attribute<'_>) -> String {
    match attr.unescape_value() {
        Ok(value) => value.into_owned(),
        Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
    }
}

fn parse_date(raw: &str, which: &str, channel: &str) -> Option<DateTime<FixedOffset>> {
    match DateTimeParser::parse_xmltv(raw) {
        Ok(date) => Some(date),
        Err(e) => {
            warn!("Programme on channel '{}' has an unusable {} time: {}", channel, which, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="test">
  <channel id="tnt">
    <display-name lang="ru">ТНТ International</display-name>
    <display-name></display-name>
    <display-name>TNT Int</display-name>
    <icon src="http://logo/tnt.png"/>
    <url>http://tnt.example</url>
  </channel>
  <programme start="20240310190000 +0300" stop="20240310200000 +0300" channel="tnt">
    <title lang="ru">Comedy &amp; Club</title>
    <sub-title>Ignored <b>nested</b></sub-title>
    <desc>Stand-up</desc>
    <category lang="en">Entertainment</category>
    <category lang="en">Comedy</category>
  </programme>
  <programme start="20240301190000 +0300" stop="20240301200000 +0300" channel="tnt">
    <title>Rerun</title>
  </programme>
  <programme start="garbage" stop="20240310200000" channel="tnt"/>
</tv>"#;

    fn dates() -> ReferenceDates {
        ReferenceDates::new(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
    }

    fn collect(xml: &str, fixups: &AliasFixups) -> Result<Vec<GuideElement>, DecodeError> {
        let mut reader = XmltvReader::new(xml.as_bytes(), 2, dates(), fixups);
        let mut elements = Vec::new();
        while let Some(element) = reader.next_element()? {
            elements.push(element);
        }
        Ok(elements)
    }

    #[test]
    fn test_decode_channel_and_programmes() {
        let fixups = AliasFixups::builtin();
        let elements = collect(SAMPLE, &fixups).unwrap();
        assert_eq!(elements.len(), 4);

        let GuideElement::Channel(channel) = &elements[0] else {
            panic!("expected channel first");
        };
        assert_eq!(channel.id, "tnt");
        assert_eq!(channel.feed, 2);
        assert_eq!(channel.icon_url.as_deref(), Some("http://logo/tnt.png"));
        let names: Vec<&str> = channel.aliases.iter().map(|a| a.text()).collect();
        // Decoded names first, then the fixup table
        assert_eq!(names, vec!["ТНТ International", "TNT Int", "ТНТ", "TNT"]);
        assert_eq!(channel.aliases[0].lang(), Some("ru"));

        let GuideElement::Programme(programme) = &elements[1] else {
            panic!("expected programme");
        };
        assert_eq!(programme.channel, "tnt");
        assert_eq!(programme.titles[0].text(), "Comedy & Club");
        assert_eq!(programme.titles[0].lang(), Some("ru"));
        assert_eq!(programme.descriptions[0].text(), "Stand-up");
        assert_eq!(programme.categories.len(), 2);
        assert!(!programme.is_past);
        assert!(!programme.is_beyond_horizon);

        let GuideElement::Programme(rerun) = &elements[2] else {
            panic!("expected programme");
        };
        assert!(rerun.is_past);

        let GuideElement::Programme(broken) = &elements[3] else {
            panic!("expected programme");
        };
        assert!(broken.start_date.is_none());
        assert!(broken.stop_date.is_some());
        assert!(!broken.is_pruned());
    }

    #[test]
    fn test_channel_without_id_aborts() {
        let xml = r#"<tv><channel><display-name>X</display-name></channel></tv>"#;
        let result = collect(xml, &AliasFixups::default());
        assert!(matches!(result, Err(DecodeError::MissingChannelId { .. })));
    }

    #[test]
    fn test_programme_without_channel_aborts() {
        let xml = r#"<tv><programme start="20240310190000" stop="20240310200000"/></tv>"#;
        let result = collect(xml, &AliasFixups::default());
        assert!(matches!(
            result,
            Err(DecodeError::MissingAttribute {
                element: "programme",
                attribute: "channel",
                ..
            })
        ));
    }

    #[test]
    fn test_malformed_xml_is_reported() {
        let xml = r#"<tv><channel id="a"><display-name>A</channel></tv>"#;
        let result = collect(xml, &AliasFixups::default());
        assert!(matches!(result, Err(DecodeError::Xml { .. })));
    }

    #[test]
    fn test_truncated_document_is_reported() {
        let xml = r#"<tv><channel id="a"><display-name>A</display-name>"#;
        let result = collect(xml, &AliasFixups::default());
        assert!(matches!(
            result,
            Err(DecodeError::UnexpectedEof { .. }) | Err(DecodeError::Xml { .. })
        ));
    }
}
