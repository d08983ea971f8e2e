use serde::Deserialize;

/// Image entry as returned by Last.fm: a URL plus a named size bucket.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SizedImage {
    #[serde(rename = "#text", default)]
    pub url: String,
    #[serde(default)]
    pub size: String,
}

/// Prefers "extralarge", then "large", then whatever is listed last.
/// Entries with an empty URL count as missing artwork.
pub fn select_image(images: &[SizedImage]) -> Option<String> {
    let chosen = images
        .iter()
        .find(|i| i.size == "extralarge")
        .or_else(|| images.iter().find(|i| i.size == "large"))
        .or_else(|| images.last())?;

    if chosen.url.trim().is_empty() {
        None
    } else {
        Some(chosen.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{select_image, SizedImage};

    fn img(size: &str, url: &str) -> SizedImage {
        SizedImage {
            url: url.to_string(),
            size: size.to_string(),
        }
    }

    #[test]
    fn prefers_extralarge_then_large_then_last() {
        let all = vec![
            img("small", "s"),
            img("large", "l"),
            img("extralarge", "xl"),
            img("mega", "m"),
        ];
        assert_eq!(select_image(&all).as_deref(), Some("xl"));

        let no_xl = vec![img("small", "s"), img("large", "l"), img("medium", "m")];
        assert_eq!(select_image(&no_xl).as_deref(), Some("l"));

        let unnamed = vec![img("small", "s"), img("medium", "m")];
        assert_eq!(select_image(&unnamed).as_deref(), Some("m"));
    }

    #[test]
    fn empty_list_or_blank_url_yields_none() {
        assert_eq!(select_image(&[]), None);
        assert_eq!(select_image(&[img("extralarge", "")]), None);
    }
}
