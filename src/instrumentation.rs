//! Page-side instrumentation relayed through a CDP binding.

use crate::ui_sequencer::UiEvent;

/// Name of the page binding the instrumentation reports through.
pub const BINDING_NAME: &str = "__flowtapEmit";

/// Installs click and SPA route-change reporting; idempotent per document.
pub const PAGE_SCRIPT: &str = include_str!("static/page_instrumentation.js");

pub const TEARDOWN_SCRIPT: &str = r#"(() => {
  const hooks = window.__flowtapHooks;
  if (!hooks) return;
  document.removeEventListener("click", hooks.onClick);
  clearInterval(hooks.timer);
  delete window.__flowtapHooks;
})();"#;

/// Decode a binding payload (`{event, element?, text?, route?}`) into a [`UiEvent`].
pub fn decode_page_signal(payload: &str) -> Result<UiEvent, serde_json::Error> {
    serde_json::from_str(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_click_payload() {
        let event = decode_page_signal(
            r#"{"event":"CLICK","element":"A","text":"Checkout","route":"https://a/cart","scrollY":10}"#,
        )
        .unwrap();
        assert_eq!(event.event, "CLICK");
        assert_eq!(event.element, "A");
        assert_eq!(event.route, "https://a/cart");
    }

    #[test]
    fn missing_optional_fields_default_to_empty() {
        let event = decode_page_signal(r#"{"event":"ROUTE_CHANGE","text":null}"#).unwrap();
        assert_eq!(event.element, "");
        assert_eq!(event.text, "");
    }

    #[test]
    fn rejects_payload_without_event() {
        assert!(decode_page_signal(r#"{"element":"A"}"#).is_err());
        assert!(decode_page_signal("not json").is_err());
    }

    #[test]
    fn script_reports_through_binding() {
        assert!(PAGE_SCRIPT.contains(BINDING_NAME));
        assert!(TEARDOWN_SCRIPT.contains("__flowtapHooks"));
    }
}
