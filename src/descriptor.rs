use std::path::Path;

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use reqwest::Url;
use serde::{Deserialize, Deserializer};

use crate::error::{OdmError, ValidationError};

/// The only protocol method we know how to fetch
pub const DOWNLOAD_METHOD: &str = "download";

/// Contents of an `.odm` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// `id` attribute of the root element, sent as `MediaID` when acquiring the license
    pub content_id: String,
    pub acquisition_url: Url,
    pub formats: Vec<Format>,
    /// Raw text of the embedded metadata document, decoded by [Metadata::parse]
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Format {
    pub name: String,
    pub parts: Parts,
    pub protocols: Vec<Protocol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Parts {
    /// count declared by the descriptor, which is not necessarily `parts.len()`
    pub count: usize,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Part {
    pub number: u32,
    pub name: String,
    pub filename: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Protocol {
    pub method: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(rename = "ContentType")]
    pub content_type: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "SortTitle")]
    pub sort_title: String,
    #[serde(rename = "Publisher")]
    pub publisher: String,
    #[serde(rename = "ThumbnailUrl")]
    pub thumbnail_url: String,
    #[serde(rename = "CoverUrl")]
    pub cover_url: String,
    #[serde(rename = "Creators", deserialize_with = "creator_list")]
    pub creators: Vec<Creator>,
    #[serde(rename = "Description")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Creator {
    #[serde(rename = "$text", default)]
    pub name: String,
    #[serde(rename = "@role", default)]
    pub role: String,
    #[serde(rename = "@file-as", default)]
    pub file_as: String,
}

fn creator_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Creator>, D::Error> {
    #[derive(Deserialize)]
    struct Creators {
        #[serde(rename = "Creator", default)]
        creator: Vec<Creator>,
    }
    Ok(Creators::deserialize(deserializer)?.creator)
}

/// Reads the descriptor at `path`, decodes the embedded metadata and checks
/// that the descriptor has a shape we can download.
pub async fn load<P: AsRef<Path>>(path: P) -> Result<(MediaDescriptor, Metadata), OdmError> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    let descriptor = MediaDescriptor::parse(&text)?;
    let metadata = Metadata::parse(&descriptor.metadata)?;
    descriptor.validate()?;
    Ok((descriptor, metadata))
}

impl MediaDescriptor {
    pub fn parse(xml: &str) -> Result<MediaDescriptor, OdmError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut state = ParseState::default();
        let mut path: Vec<String> = Vec::new();
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    state.open(&path, &e)?;
                    path.push(local_name(&e));
                }
                Event::Empty(e) => {
                    state.open(&path, &e)?;
                    if path.is_empty() {
                        break;
                    }
                }
                Event::End(_) => {
                    path.pop();
                    // anything after the root element is not part of the descriptor
                    if path.is_empty() {
                        break;
                    }
                }
                Event::Text(t) => state.text(&path, &t.unescape()?),
                Event::CData(c) => state.text(&path, &String::from_utf8_lossy(&c.into_inner())),
                Event::Eof if !path.is_empty() => {
                    return Err(OdmError::parse(format!(
                        "unexpected end of document inside <{}>",
                        path.join("/")
                    )));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        state.finish()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let format = self.format()?;
        if format.parts.count != format.parts.parts.len() {
            return Err(ValidationError::PartCountMismatch {
                declared: format.parts.count,
                actual: format.parts.parts.len(),
            });
        }
        let protocol = format.protocol()?;
        if protocol.method != DOWNLOAD_METHOD {
            return Err(ValidationError::UnsupportedProtocol(protocol.method.clone()));
        }
        Ok(())
    }

    /// The single format of a valid descriptor
    pub fn format(&self) -> Result<&Format, ValidationError> {
        match self.formats.as_slice() {
            [format] => Ok(format),
            formats => Err(ValidationError::FormatCount(formats.len())),
        }
    }
}

impl Format {
    pub fn protocol(&self) -> Result<&Protocol, ValidationError> {
        match self.protocols.as_slice() {
            [protocol] => Ok(protocol),
            protocols => Err(ValidationError::ProtocolCount(protocols.len())),
        }
    }

    /// Parts by ascending number. Parts sharing a number keep document order.
    pub fn ordered_parts(&self) -> Vec<&Part> {
        let mut parts: Vec<&Part> = self.parts.parts.iter().collect();
        parts.sort_by_key(|p| p.number);
        parts
    }
}

impl Protocol {
    pub fn part_url(&self, part: &Part) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), part.filename)
    }
}

impl Metadata {
    pub fn parse(xml: &str) -> Result<Metadata, OdmError> {
        let xml = xml.trim();
        if xml.is_empty() {
            return Err(OdmError::parse("descriptor has no embedded metadata"));
        }
        Ok(quick_xml::de::from_str(xml)?)
    }

    pub fn first_creator(&self) -> Option<&Creator> {
        self.creators.first()
    }
}

#[derive(Default)]
struct ParseState {
    root_seen: bool,
    content_id: String,
    acquisition_url: String,
    formats: Vec<Format>,
    metadata: String,
}

impl ParseState {
    fn open(&mut self, path: &[String], element: &BytesStart) -> Result<(), OdmError> {
        let name = local_name(element);
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        match (path.as_slice(), name.as_str()) {
            ([], _) => {
                self.root_seen = true;
                self.content_id = attribute(element, "id")?.unwrap_or_default();
            }
            ([_, "Formats"], "Format") => self.formats.push(Format {
                name: attribute(element, "name")?.unwrap_or_default(),
                ..Default::default()
            }),
            ([_, "Formats", "Format"], "Parts") => {
                if let Some(format) = self.formats.last_mut() {
                    format.parts.count = numeric_attribute(element, "count")?.unwrap_or(0);
                }
            }
            ([_, "Formats", "Format", "Parts"], "Part") => {
                let part = Part {
                    number: numeric_attribute(element, "number")?.unwrap_or(0),
                    name: attribute(element, "name")?.unwrap_or_default(),
                    filename: attribute(element, "filename")?.unwrap_or_default(),
                    duration: attribute(element, "duration")?.unwrap_or_default(),
                };
                if let Some(format) = self.formats.last_mut() {
                    format.parts.parts.push(part);
                }
            }
            ([_, "Formats", "Format", "Protocols"], "Protocol") => {
                let protocol = Protocol {
                    method: attribute(element, "method")?.unwrap_or_default(),
                    base_url: attribute(element, "baseurl")?.unwrap_or_default(),
                };
                if let Some(format) = self.formats.last_mut() {
                    format.protocols.push(protocol);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, path: &[String], text: &str) {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        match path.as_slice() {
            // character data directly under the root is the metadata document
            [_] => self.metadata.push_str(text),
            [_, "License", "AcquisitionUrl"] => self.acquisition_url.push_str(text),
            _ => {}
        }
    }

    fn finish(self) -> Result<MediaDescriptor, OdmError> {
        if !self.root_seen {
            return Err(OdmError::parse("document has no root element"));
        }
        let acquisition_url = self.acquisition_url.trim();
        if acquisition_url.is_empty() {
            return Err(OdmError::parse("missing License/AcquisitionUrl"));
        }
        let acquisition_url = Url::parse(acquisition_url).map_err(|e| {
            OdmError::parse(format!("invalid acquisition url `{acquisition_url}`: {e}"))
        })?;

        Ok(MediaDescriptor {
            content_id: self.content_id,
            acquisition_url,
            formats: self.formats,
            metadata: self.metadata,
        })
    }
}

fn local_name(element: &BytesStart) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn attribute(element: &BytesStart, name: &str) -> Result<Option<String>, OdmError> {
    match element.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn numeric_attribute<T: std::str::FromStr>(
    element: &BytesStart,
    name: &str,
) -> Result<Option<T>, OdmError> {
    match attribute(element, name)? {
        Some(value) => value.trim().parse().map(Some).map_err(|_| {
            OdmError::parse(format!(
                "attribute `{name}` of <{}> is not a number: `{value}`",
                local_name(element)
            ))
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"<Metadata>
  <ContentType>Audiobook</ContentType>
  <Title>The Long Walk</Title>
  <SortTitle>Long Walk</SortTitle>
  <Publisher>Acme Audio</Publisher>
  <ThumbnailUrl>https://img.example.com/thumb.jpg</ThumbnailUrl>
  <CoverUrl>https://img.example.com/cover.png?size=large</CoverUrl>
  <Creators>
    <Creator role="Author" file-as="Doe, Jane">Jane Doe</Creator>
    <Creator role="Narrator" file-as="Roe, Rick">Rick Roe</Creator>
  </Creators>
  <Subjects><Subject>Fiction</Subject></Subjects>
  <Description>&lt;p&gt;A story.&lt;/p&gt;</Description>
</Metadata>"#;

    fn odm(formats: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<OverDriveMedia id="{{A1B2C3D4-0000-1111-2222-333344445555}}" ODMVersion="1.2">
  <License>
    <AcquisitionUrl>https://license.example.com/license/acquire.asmx</AcquisitionUrl>
  </License>
  <![CDATA[{METADATA}]]>
  <Formats>{formats}</Formats>
</OverDriveMedia>"#
        )
    }

    fn mp3_format(count: usize, parts: &[(u32, &str, &str)], method: &str) -> String {
        let parts: String = parts
            .iter()
            .map(|(number, name, duration)| {
                format!(
                    r#"<Part number="{number}" filename="{{X}}Fmt425-Part0{number}.mp3" name="{name}" duration="{duration}" filesize="1024" />"#
                )
            })
            .collect();
        format!(
            r#"<Format name="MP3 Format">
      <Protocols><Protocol method="{method}" baseurl="https://dl.example.com/files" /></Protocols>
      <Parts count="{count}">{parts}</Parts>
    </Format>"#
        )
    }

    #[test]
    fn test_parse_descriptor_fields() {
        let xml = odm(&mp3_format(
            2,
            &[(1, "Part 1", "5:17"), (2, "Part 2", "1:02:03")],
            "download",
        ));
        let descriptor = MediaDescriptor::parse(&xml).unwrap();

        assert_eq!(
            descriptor.content_id,
            "{A1B2C3D4-0000-1111-2222-333344445555}"
        );
        assert_eq!(
            descriptor.acquisition_url.as_str(),
            "https://license.example.com/license/acquire.asmx"
        );
        assert!(descriptor.validate().is_ok());

        let format = descriptor.format().unwrap();
        assert_eq!(format.name, "MP3 Format");
        assert_eq!(format.parts.count, 2);
        assert_eq!(
            format.parts.parts[1],
            Part {
                number: 2,
                name: "Part 2".to_string(),
                filename: "{X}Fmt425-Part02.mp3".to_string(),
                duration: "1:02:03".to_string(),
            }
        );
        let protocol = format.protocol().unwrap();
        assert_eq!(protocol.method, "download");
        assert_eq!(
            protocol.part_url(&format.parts.parts[0]),
            "https://dl.example.com/files/{X}Fmt425-Part01.mp3"
        );
    }

    #[test]
    fn test_parse_embedded_metadata() {
        let xml = odm(&mp3_format(1, &[(1, "Part 1", "5:17")], "download"));
        let descriptor = MediaDescriptor::parse(&xml).unwrap();
        let metadata = Metadata::parse(&descriptor.metadata).unwrap();

        assert_eq!(metadata.content_type, "Audiobook");
        assert_eq!(metadata.title, "The Long Walk");
        assert_eq!(metadata.sort_title, "Long Walk");
        assert_eq!(metadata.publisher, "Acme Audio");
        assert_eq!(metadata.thumbnail_url, "https://img.example.com/thumb.jpg");
        assert_eq!(
            metadata.cover_url,
            "https://img.example.com/cover.png?size=large"
        );
        assert_eq!(metadata.description, "<p>A story.</p>");
        assert_eq!(
            metadata.creators,
            vec![
                Creator {
                    name: "Jane Doe".to_string(),
                    role: "Author".to_string(),
                    file_as: "Doe, Jane".to_string(),
                },
                Creator {
                    name: "Rick Roe".to_string(),
                    role: "Narrator".to_string(),
                    file_as: "Roe, Rick".to_string(),
                },
            ]
        );
        assert_eq!(metadata.first_creator().unwrap().name, "Jane Doe");
    }

    #[test]
    fn test_metadata_missing_fields_default_to_empty() {
        let metadata = Metadata::parse("<Metadata><Title>Only</Title></Metadata>").unwrap();
        assert_eq!(metadata.title, "Only");
        assert!(metadata.creators.is_empty());
        assert!(metadata.cover_url.is_empty());
        assert!(metadata.first_creator().is_none());
    }

    #[test]
    fn test_missing_metadata_is_parse_error() {
        let xml = r#"<OverDriveMedia id="x"><License><AcquisitionUrl>https://l.example.com/</AcquisitionUrl></License></OverDriveMedia>"#;
        let descriptor = MediaDescriptor::parse(xml).unwrap();
        assert!(matches!(
            Metadata::parse(&descriptor.metadata),
            Err(OdmError::Parse { .. })
        ));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let result = MediaDescriptor::parse("<OverDriveMedia><License></OverDriveMedia>");
        assert!(matches!(result, Err(OdmError::Parse { .. })));
        assert!(matches!(
            MediaDescriptor::parse(""),
            Err(OdmError::Parse { .. })
        ));
    }

    #[test]
    fn test_truncated_document_is_parse_error() {
        let full = odm(&mp3_format(1, &[(1, "Part 1", "5:17")], "download"));
        let truncated = full.trim_end().trim_end_matches("</OverDriveMedia>");
        assert!(MediaDescriptor::parse(&full).is_ok());
        assert!(matches!(
            MediaDescriptor::parse(truncated),
            Err(OdmError::Parse { .. })
        ));
    }

    #[test]
    fn test_only_first_root_element_is_read() {
        let xml = r#"<A id="x"><License><AcquisitionUrl>https://a.example.com/l</AcquisitionUrl></License></A><B id="y"/>"#;
        let descriptor = MediaDescriptor::parse(xml).unwrap();
        assert_eq!(descriptor.content_id, "x");
        assert_eq!(descriptor.acquisition_url.as_str(), "https://a.example.com/l");

        let xml = r#"<A id="x"><License><AcquisitionUrl>https://a.example.com/l</AcquisitionUrl></License></A><B id="y"><License><AcquisitionUrl>https://b.example.com/l</AcquisitionUrl></License></B>"#;
        let descriptor = MediaDescriptor::parse(xml).unwrap();
        assert_eq!(descriptor.content_id, "x");
        assert_eq!(descriptor.acquisition_url.as_str(), "https://a.example.com/l");
    }

    #[test]
    fn test_invalid_acquisition_url_is_parse_error() {
        let xml = r#"<OverDriveMedia id="x"><License><AcquisitionUrl>not a url</AcquisitionUrl></License></OverDriveMedia>"#;
        assert!(matches!(
            MediaDescriptor::parse(xml),
            Err(OdmError::Parse { .. })
        ));
    }

    #[test]
    fn test_non_numeric_part_count_is_parse_error() {
        let xml = odm(r#"<Format name="MP3"><Parts count="two"></Parts></Format>"#);
        assert!(matches!(
            MediaDescriptor::parse(&xml),
            Err(OdmError::Parse { .. })
        ));
    }

    #[test]
    fn test_rejects_two_formats() {
        let format = mp3_format(1, &[(1, "Part 1", "5:17")], "download");
        let xml = odm(&format!("{format}{format}"));
        let descriptor = MediaDescriptor::parse(&xml).unwrap();
        assert_eq!(descriptor.validate(), Err(ValidationError::FormatCount(2)));
    }

    #[test]
    fn test_rejects_missing_format() {
        let descriptor = MediaDescriptor::parse(&odm("")).unwrap();
        assert_eq!(descriptor.validate(), Err(ValidationError::FormatCount(0)));
    }

    #[test]
    fn test_rejects_part_count_mismatch() {
        let xml = odm(&mp3_format(
            3,
            &[(1, "Part 1", "5:17"), (2, "Part 2", "6:00")],
            "download",
        ));
        let descriptor = MediaDescriptor::parse(&xml).unwrap();
        assert_eq!(
            descriptor.validate(),
            Err(ValidationError::PartCountMismatch {
                declared: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_rejects_streaming_protocol() {
        let xml = odm(&mp3_format(1, &[(1, "Part 1", "5:17")], "streaming"));
        let descriptor = MediaDescriptor::parse(&xml).unwrap();
        assert_eq!(
            descriptor.validate(),
            Err(ValidationError::UnsupportedProtocol("streaming".to_string()))
        );
    }

    #[test]
    fn test_rejects_two_protocols() {
        let xml = odm(
            r#"<Format name="MP3"><Protocols>
                <Protocol method="download" baseurl="https://a.example.com" />
                <Protocol method="download" baseurl="https://b.example.com" />
            </Protocols><Parts count="0"></Parts></Format>"#,
        );
        let descriptor = MediaDescriptor::parse(&xml).unwrap();
        assert_eq!(
            descriptor.validate(),
            Err(ValidationError::ProtocolCount(2))
        );
    }

    #[test]
    fn test_ordered_parts_sorts_by_number() {
        let xml = odm(&mp3_format(
            3,
            &[(3, "Part 3", "1"), (1, "Part 1", "1"), (2, "Part 2", "1")],
            "download",
        ));
        let descriptor = MediaDescriptor::parse(&xml).unwrap();
        let names: Vec<&str> = descriptor
            .format()
            .unwrap()
            .ordered_parts()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["Part 1", "Part 2", "Part 3"]);
    }

    #[tokio::test]
    async fn test_load_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.odm");
        tokio::fs::write(
            &path,
            odm(&mp3_format(1, &[(1, "Part 1", "5:17")], "download")),
        )
        .await
        .unwrap();
        let (descriptor, metadata) = load(&path).await.unwrap();
        assert_eq!(descriptor.format().unwrap().parts.parts.len(), 1);
        assert_eq!(metadata.title, "The Long Walk");

        let bad = dir.path().join("bad.odm");
        tokio::fs::write(
            &bad,
            odm(&mp3_format(1, &[(1, "Part 1", "5:17")], "streaming")),
        )
        .await
        .unwrap();
        assert!(matches!(
            load(&bad).await,
            Err(OdmError::Validation(ValidationError::UnsupportedProtocol(_)))
        ));
    }
}
