//! Quick-XML based XMLTV parser
//!
//! Streams an XMLTV document into a [`GuideFragment`]. Programmes are
//! collected first and attached once every `<channel>` is known, so documents
//! that list programmes before their channel still parse. Programmes without a
//! usable start/stop pair, or for undeclared channels, are skipped and counted.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

use crate::errors::{FetchError, FetchResult};
use crate::models::{Channel, EpisodeNumber, GuideFragment, ProgramEntry, Rating};
use crate::utils::time::parse_xmltv_time;

/// Counters reported alongside a parsed document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmltvParseStats {
    pub channels: usize,
    pub programs: usize,
    pub skipped_programs: usize,
}

/// Parse XMLTV content using streaming quick-xml parser
pub fn parse_xmltv_document(content: &str) -> FetchResult<(GuideFragment, XmltvParseStats)> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut fragment = GuideFragment::new();
    let mut stats = XmltvParseStats::default();
    let mut programs: Vec<ProgramEntry> = Vec::new();

    let mut current_channel: Option<Channel> = None;
    let mut current_program: Option<ProgramEntry> = None;
    let mut in_programme = false;
    let mut episode_system: Option<String> = None;
    let mut rating_system: Option<String> = None;
    let mut in_rating = false;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = element_name(e)?;
                match name.as_str() {
                    "channel" => {
                        let attrs = parse_attributes(e);
                        current_channel = attrs.get("id").map(|id| Channel::new(id.trim()));
                    }
                    "programme" => {
                        in_programme = true;
                        current_program = start_program(&parse_attributes(e));
                        if current_program.is_none() {
                            stats.skipped_programs += 1;
                        }
                    }
                    "episode-num" => {
                        episode_system = parse_attributes(e).get("system").cloned();
                    }
                    "rating" => {
                        in_rating = true;
                        rating_system = parse_attributes(e).get("system").cloned();
                    }
                    "previously-shown" => {
                        mark_previously_shown(current_program.as_mut(), &parse_attributes(e));
                    }
                    _ => {}
                }
                current_text.clear();
            }

            Ok(Event::End(ref e)) => {
                let name = std::str::from_utf8(e.local_name().as_ref())
                    .map_err(|e| {
                        FetchError::invalid_response(format!("Invalid UTF-8 in XML element name: {e}"))
                    })?
                    .to_string();
                let text = current_text.trim().to_string();

                if let Some(ref mut channel) = current_channel {
                    match name.as_str() {
                        "display-name" if !text.is_empty() => {
                            if channel.number.is_none() && text.chars().all(|c| c.is_ascii_digit() || c == '.') {
                                channel.number = Some(text.clone());
                            }
                            if !channel.display_names.contains(&text) {
                                channel.display_names.push(text.clone());
                            }
                        }
                        "channel" => {
                            if let Some(channel) = current_channel.take() {
                                if fragment.insert_channel(channel) {
                                    stats.channels += 1;
                                }
                            }
                        }
                        _ => {}
                    }
                } else if let Some(ref mut program) = current_program {
                    match name.as_str() {
                        "title" if !text.is_empty() && program.title.is_empty() => {
                            program.title = text;
                        }
                        "sub-title" if !text.is_empty() => program.sub_title = Some(text),
                        "desc" if !text.is_empty() => program.description = Some(text),
                        "date" if !text.is_empty() => program.date = Some(text),
                        "category" if !text.is_empty() => {
                            if !program.categories.contains(&text) {
                                program.categories.push(text);
                            }
                        }
                        "length" => program.length_minutes = text.parse().ok(),
                        "url" if !text.is_empty() => program.url = Some(text),
                        "episode-num" if !text.is_empty() => {
                            program.episode_numbers.push(EpisodeNumber {
                                system: episode_system.take().unwrap_or_else(|| "onscreen".to_string()),
                                value: text,
                            });
                        }
                        "value" if in_rating && !text.is_empty() => {
                            program.rating = Some(Rating {
                                system: rating_system.clone().unwrap_or_else(|| "MPAA".to_string()),
                                value: text,
                            });
                        }
                        "rating" => {
                            in_rating = false;
                            rating_system = None;
                        }
                        "stereo" if !text.is_empty() => program.audio = Some(text),
                        "programme" => {
                            if let Some(program) = current_program.take() {
                                programs.push(program);
                            }
                            in_programme = false;
                        }
                        _ => {}
                    }
                } else if name == "programme" {
                    in_programme = false;
                }

                current_text.clear();
            }

            Ok(Event::Empty(ref e)) => {
                let name = element_name(e)?;
                let attrs = parse_attributes(e);

                if let Some(ref mut channel) = current_channel {
                    if name == "icon" {
                        channel.icon = attrs.get("src").cloned();
                    }
                } else if let Some(ref mut program) = current_program {
                    match name.as_str() {
                        "icon" => program.icon = attrs.get("src").cloned(),
                        "live" => program.flags.live = true,
                        "new" => program.flags.new = true,
                        "previously-shown" => mark_previously_shown(Some(program), &attrs),
                        "subtitles" => {
                            program.subtitles =
                                Some(attrs.get("type").cloned().unwrap_or_else(|| "teletext".to_string()))
                        }
                        "audio" => program.audio = attrs.get("type").cloned(),
                        _ => {}
                    }
                } else if name == "programme" && !in_programme {
                    stats.skipped_programs += 1;
                }
            }

            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| FetchError::invalid_response(format!("Invalid text in XMLTV: {e}")))?;
                current_text.push_str(&text);
            }

            Ok(Event::CData(e)) => {
                let text = std::str::from_utf8(&e)
                    .map_err(|e| FetchError::invalid_response(format!("Invalid UTF-8 in CDATA: {e}")))?;
                current_text.push_str(text);
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(FetchError::invalid_response(format!(
                    "XML parsing error at position {}: {e}",
                    reader.error_position()
                )));
            }

            _ => {}
        }
    }

    for program in programs {
        if program.title.is_empty() {
            stats.skipped_programs += 1;
        } else if fragment.push_program(program) {
            stats.programs += 1;
        } else {
            stats.skipped_programs += 1;
        }
    }

    Ok((fragment, stats))
}

fn element_name(element: &BytesStart) -> FetchResult<String> {
    std::str::from_utf8(element.local_name().as_ref())
        .map(str::to_string)
        .map_err(|e| FetchError::invalid_response(format!("Invalid UTF-8 in XML element name: {e}")))
}

fn start_program(attrs: &HashMap<String, String>) -> Option<ProgramEntry> {
    let channel = attrs.get("channel")?.trim();
    let start = parse_xmltv_time(attrs.get("start")?)?;
    let stop = parse_xmltv_time(attrs.get("stop")?)?;
    if channel.is_empty() || stop <= start {
        return None;
    }
    Some(ProgramEntry::new(channel, start, stop, String::new()))
}

fn mark_previously_shown(program: Option<&mut ProgramEntry>, attrs: &HashMap<String, String>) {
    if let Some(program) = program {
        program.flags.previously_shown = true;
        program.flags.original_air_date = attrs.get("start").cloned();
    }
}

/// Parse XML attributes into a HashMap
fn parse_attributes(element: &BytesStart) -> HashMap<String, String> {
    let mut attrs = HashMap::new();

    for attr in element.attributes().flatten() {
        if let (Ok(key), Ok(value)) = (
            std::str::from_utf8(attr.key.as_ref()),
            attr.unescape_value(),
        ) {
            attrs.insert(key.to_string(), value.into_owned());
        }
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="test">
  <programme start="20240301180000 +0000" stop="20240301190000 +0000" channel="late.1">
    <title>Defined Later</title>
  </programme>
  <channel id="wabc.1">
    <display-name>WABC</display-name>
    <display-name>7</display-name>
    <icon src="https://example.com/wabc.png"/>
  </channel>
  <channel id="late.1">
    <display-name>Late &amp; Great</display-name>
  </channel>
  <programme start="20240301180000 +0000" stop="20240301183000 +0000" channel="wabc.1">
    <title lang="en">News &amp; Weather</title>
    <sub-title>Evening</sub-title>
    <desc><![CDATA[Local <news>]]></desc>
    <category lang="en">News</category>
    <length units="minutes">30</length>
    <episode-num system="dd_progid">EP000001.0001</episode-num>
    <episode-num system="xmltv_ns">0.4.</episode-num>
    <live/>
    <rating system="VCHIP"><value>TV-G</value></rating>
  </programme>
  <programme start="20240301183000 +0000" stop="20240301183000 +0000" channel="wabc.1">
    <title>Zero length</title>
  </programme>
  <programme start="20240301190000 +0000" stop="20240301200000 +0000" channel="ghost">
    <title>Orphan</title>
  </programme>
  <programme start="20240301190000 +0000" stop="20240301200000 +0000" channel="wabc.1">
    <title>Rerun</title>
    <previously-shown start="20200101000000"/>
  </programme>
</tv>"#;

    #[test]
    fn test_parse_channels_and_programmes() {
        let (fragment, stats) = parse_xmltv_document(SAMPLE).unwrap();

        assert_eq!(stats.channels, 2);
        assert_eq!(stats.programs, 3);
        assert_eq!(stats.skipped_programs, 2);

        let wabc = fragment.channel("wabc.1").unwrap();
        assert_eq!(wabc.display_names, vec!["WABC".to_string(), "7".to_string()]);
        assert_eq!(wabc.number.as_deref(), Some("7"));
        assert_eq!(wabc.icon.as_deref(), Some("https://example.com/wabc.png"));
        assert_eq!(fragment.channel("late.1").unwrap().preferred_name(), "Late & Great");

        let programs = fragment.programs_for("wabc.1");
        assert_eq!(programs.len(), 2);
        let news = &programs[0];
        assert_eq!(news.title, "News & Weather");
        assert_eq!(news.sub_title.as_deref(), Some("Evening"));
        assert_eq!(news.description.as_deref(), Some("Local <news>"));
        assert_eq!(news.categories, vec!["News".to_string()]);
        assert_eq!(news.length_minutes, Some(30));
        assert_eq!(news.episode_numbers.len(), 2);
        assert_eq!(news.episode_numbers[0].system, "dd_progid");
        assert!(news.flags.live);
        let rating = news.rating.as_ref().unwrap();
        assert_eq!((rating.system.as_str(), rating.value.as_str()), ("VCHIP", "TV-G"));

        let rerun = &programs[1];
        assert!(rerun.flags.previously_shown);
        assert_eq!(rerun.flags.original_air_date.as_deref(), Some("20200101000000"));

        assert_eq!(fragment.programs_for("late.1").len(), 1);
    }

    #[test]
    fn test_malformed_document_is_invalid_response() {
        let err = parse_xmltv_document("<tv><channel id=\"a\"></tv>").unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponse { .. }));
    }

    #[test]
    fn test_empty_document_has_no_channels() {
        let (fragment, stats) = parse_xmltv_document("<tv></tv>").unwrap();
        assert!(fragment.is_empty());
        assert_eq!(stats, XmltvParseStats::default());
    }
}
