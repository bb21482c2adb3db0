//! Ad snippet renderer.
//!
//! Produces the self-contained HTML+CSS fragment that the embed script
//! injects into a publisher page. Everything creative-supplied is escaped;
//! the anchor carries data attributes the embed script uses to report
//! clicks back to the gateway.

use crate::models::content::AdCreative;
use crate::models::parcel::ParcelTraits;

/// HTML-escape text interpolated into the snippet.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the snippet for one parcel.
pub fn render(parcel_id: u64, traits: &ParcelTraits, creative: &AdCreative) -> String {
    let title = escape(&creative.title);
    let description = escape(&creative.description);
    let link = escape(&creative.link_url);
    let image = escape(&creative.image_url);

    format!(
        r#"<div class="adparcel" style="width:{w}px;height:{h}px;overflow:hidden;border:1px solid #e2e2e2;border-radius:6px;font-family:system-ui,sans-serif;background:#fff;">
  <a href="{link}" target="_blank" rel="noopener sponsored" data-adparcel-id="{id}" style="display:flex;flex-direction:column;height:100%;text-decoration:none;color:inherit;">
    <img src="{image}" alt="{title}" style="width:100%;flex:1;object-fit:cover;min-height:0;">
    <div style="padding:8px;">
      <div style="font-size:14px;font-weight:600;line-height:1.2;">{title}</div>
      <div style="font-size:12px;color:#555;margin-top:2px;line-height:1.3;">{description}</div>
    </div>
  </a>
</div>"#,
        w = traits.width,
        h = traits.height,
        id = parcel_id,
        link = link,
        image = image,
        title = title,
        description = description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creative() -> AdCreative {
        AdCreative {
            title: "Rust & Coffee".into(),
            description: "The <best> brew".into(),
            link_url: "https://example.com/landing?a=1&b=2".into(),
            image_url: "https://cdn.example.com/ad.png".into(),
        }
    }

    #[test]
    fn test_render_embeds_dimensions_and_parcel_id() {
        let html = render(42, &ParcelTraits { width: 300, height: 250 }, &creative());
        assert!(html.contains("width:300px"));
        assert!(html.contains("height:250px"));
        assert!(html.contains(r#"data-adparcel-id="42""#));
    }

    #[test]
    fn test_render_escapes_creative_text() {
        let html = render(1, &ParcelTraits { width: 300, height: 250 }, &creative());
        assert!(html.contains("Rust &amp; Coffee"));
        assert!(html.contains("The &lt;best&gt; brew"));
        assert!(!html.contains("<best>"));
    }

    #[test]
    fn test_render_escapes_attribute_injection() {
        let mut c = creative();
        c.image_url = r#"x" onerror="alert(1)"#.into();
        let html = render(1, &ParcelTraits { width: 300, height: 250 }, &c);
        assert!(!html.contains(r#"onerror="alert"#));
        assert!(html.contains("&quot;"));
    }
}
