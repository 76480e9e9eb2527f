use rust_embed::RustEmbed;
use std::borrow::Cow;

/// Files compiled into the binary
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct StaticAssets;

pub const XMLTV_DTD: &str = "xmltv.dtd";

impl StaticAssets {
    pub fn get_asset(path: &str) -> Option<Cow<'static, [u8]>> {
        Self::get(path).map(|file| file.data)
    }

    pub fn get_content_type(path: &str) -> &'static str {
        match path.rsplit('.').next() {
            Some("dtd") => "application/xml-dtd",
            Some("xml") => "application/xml",
            _ => "application/octet-stream",
        }
    }

    /// The XMLTV DTD referenced from every rendered guide
    pub fn xmltv_dtd() -> Option<Cow<'static, [u8]>> {
        Self::get_asset(XMLTV_DTD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xmltv_dtd_is_embedded() {
        let dtd = StaticAssets::xmltv_dtd().unwrap();
        let text = std::str::from_utf8(&dtd).unwrap();
        assert!(text.contains("<!ELEMENT tv"));
        assert!(text.contains("<!ELEMENT programme"));
        assert_eq!(StaticAssets::get_content_type(XMLTV_DTD), "application/xml-dtd");
    }
}
