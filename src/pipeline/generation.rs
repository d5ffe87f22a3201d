//! XMLTV document generation

use crate::models::{Channel, MergedGuide, ProgramEntry};
use crate::utils::time::format_xmltv_time;

pub const GENERATOR_NAME: &str = "epg-harvester";

/// Render a merged guide as an XMLTV document
///
/// Channels are written first in merged order, then every programme grouped
/// by channel in start order.
pub fn generate_xmltv(guide: &MergedGuide) -> String {
    let mut xmltv = String::new();

    xmltv.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xmltv.push_str("<!DOCTYPE tv SYSTEM \"xmltv.dtd\">\n");
    xmltv.push_str(&format!("<tv generator-info-name=\"{GENERATOR_NAME}\">\n"));

    for channel in guide.channels() {
        write_channel(&mut xmltv, channel);
    }

    for program in guide.programs() {
        write_program(&mut xmltv, program);
    }

    xmltv.push_str("</tv>\n");
    xmltv
}

fn write_channel(xmltv: &mut String, channel: &Channel) {
    xmltv.push_str(&format!("  <channel id=\"{}\">\n", escape_xml(&channel.id)));

    if channel.display_names.is_empty() {
        xmltv.push_str(&format!(
            "    <display-name>{}</display-name>\n",
            escape_xml(&channel.id)
        ));
    }
    for name in &channel.display_names {
        xmltv.push_str(&format!("    <display-name>{}</display-name>\n", escape_xml(name)));
    }
    if let Some(number) = &channel.number {
        if !channel.display_names.contains(number) {
            xmltv.push_str(&format!("    <display-name>{}</display-name>\n", escape_xml(number)));
        }
    }

    if let Some(icon) = channel.icon.as_deref().filter(|s| !s.is_empty()) {
        xmltv.push_str(&format!("    <icon src=\"{}\" />\n", escape_xml(icon)));
    }

    xmltv.push_str("  </channel>\n");
}

fn write_program(xmltv: &mut String, program: &ProgramEntry) {
    xmltv.push_str(&format!(
        "  <programme start=\"{}\" stop=\"{}\" channel=\"{}\">\n",
        format_xmltv_time(&program.start),
        format_xmltv_time(&program.stop),
        escape_xml(&program.channel_id)
    ));

    xmltv.push_str(&format!(
        "    <title lang=\"en\">{}</title>\n",
        escape_xml(&program.title)
    ));
    if let Some(sub_title) = non_empty(&program.sub_title) {
        xmltv.push_str(&format!(
            "    <sub-title lang=\"en\">{}</sub-title>\n",
            escape_xml(sub_title)
        ));
    }
    if let Some(desc) = non_empty(&program.description) {
        xmltv.push_str(&format!("    <desc lang=\"en\">{}</desc>\n", escape_xml(desc)));
    }
    if let Some(date) = non_empty(&program.date) {
        xmltv.push_str(&format!("    <date>{}</date>\n", escape_xml(date)));
    }
    for category in program.categories.iter().filter(|c| !c.is_empty()) {
        xmltv.push_str(&format!(
            "    <category lang=\"en\">{}</category>\n",
            escape_xml(category)
        ));
    }
    if let Some(length) = program.length_minutes {
        xmltv.push_str(&format!("    <length units=\"minutes\">{length}</length>\n"));
    }
    if let Some(icon) = non_empty(&program.icon) {
        xmltv.push_str(&format!("    <icon src=\"{}\" />\n", escape_xml(icon)));
    }
    if let Some(url) = non_empty(&program.url) {
        xmltv.push_str(&format!("    <url>{}</url>\n", escape_xml(url)));
    }
    for episode in &program.episode_numbers {
        xmltv.push_str(&format!(
            "    <episode-num system=\"{}\">{}</episode-num>\n",
            escape_xml(&episode.system),
            escape_xml(&episode.value)
        ));
    }

    let flags = &program.flags;
    if flags.live {
        xmltv.push_str("    <live />\n");
    }
    if flags.new {
        xmltv.push_str("    <new />\n");
    }
    if flags.previously_shown {
        match non_empty(&flags.original_air_date) {
            Some(start) => xmltv.push_str(&format!(
                "    <previously-shown start=\"{}\" />\n",
                escape_xml(start)
            )),
            None => xmltv.push_str("    <previously-shown />\n"),
        }
    }

    if let Some(audio) = non_empty(&program.audio) {
        xmltv.push_str(&format!("    <audio type=\"{}\" />\n", escape_xml(audio)));
    }
    if let Some(subtitles) = non_empty(&program.subtitles) {
        xmltv.push_str(&format!("    <subtitles type=\"{}\" />\n", escape_xml(subtitles)));
    }
    if let Some(rating) = &program.rating {
        xmltv.push_str(&format!(
            "    <rating system=\"{}\">\n      <value>{}</value>\n    </rating>\n",
            escape_xml(&rating.system),
            escape_xml(&rating.value)
        ));
    }

    xmltv.push_str("  </programme>\n");
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Escape XML special characters, dropping control characters XML 1.0 cannot carry
pub fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '\t' | '\n' | '\r' => escaped.push(c),
            c if c < '\u{20}' || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => escaped.push(c),
        }
    }
    escaped
}
