//! Scripts injected into the page.
//!
//! Sync scripts `return` their result. Async scripts receive the WebDriver
//! completion callback as their last argument.

/// `arguments[0]`: XPath. Returns the first matching element or null.
pub const RESOLVE_XPATH: &str = r#"
const result = document.evaluate(arguments[0], document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
return result.singleNodeValue;
"#;

/// `arguments[0]`: root element. Returns `[element, src]` pairs for every
/// descendant video in document order.
pub const VIDEO_DESCENDANTS: &str = r#"
return Array.from(arguments[0].querySelectorAll("video")).map(v => [v, v.getAttribute("src")]);
"#;

/// `arguments[0]`: container element. Installs (or replaces) a subtree
/// observer that buffers every added element as `[element, isVideo, src]`.
pub const INSTALL_OBSERVER: &str = r#"
const container = arguments[0];
if (window.__lastframeObserver) { window.__lastframeObserver.disconnect(); }
window.__lastframeAdditions = [];
const observer = new MutationObserver(mutations => {
  for (const mutation of mutations) {
    for (const node of mutation.addedNodes) {
      if (node.nodeType !== Node.ELEMENT_NODE) { continue; }
      const isVideo = node.tagName === "VIDEO";
      window.__lastframeAdditions.push([node, isVideo, isVideo ? node.getAttribute("src") : null]);
    }
  }
});
observer.observe(container, { childList: true, subtree: true });
window.__lastframeObserver = observer;
return true;
"#;

/// Returns and clears the buffered additions.
pub const DRAIN_ADDITIONS: &str = r#"
const batch = window.__lastframeAdditions || [];
window.__lastframeAdditions = [];
return batch;
"#;

/// Disconnects the observer, if any.
pub const DISCONNECT_OBSERVER: &str = r#"
if (window.__lastframeObserver) { window.__lastframeObserver.disconnect(); window.__lastframeObserver = null; }
window.__lastframeAdditions = [];
return true;
"#;

pub const PAUSE: &str = "arguments[0].pause(); return true;";

pub const READY_STATE: &str = "return arguments[0].readyState;";

/// Async. `arguments[1]`: limit in ms. Resolves `true` once the video has
/// current data, `false` if the limit elapses first.
pub const WAIT_UNTIL_READY: &str = r#"
const [video, limitMs, done] = arguments;
if (video.readyState >= 2) { done(true); return; }
const onReady = () => { clearTimeout(timer); done(true); };
const timer = setTimeout(() => {
  video.removeEventListener("loadeddata", onReady);
  done(false);
}, limitMs);
video.addEventListener("loadeddata", onReady, { once: true });
"#;

/// Returns the duration, or null when it is not a finite number.
pub const DURATION: &str = r#"
const d = arguments[0].duration;
return Number.isFinite(d) ? d : null;
"#;

/// Async. `arguments[1]`: position, `arguments[2]`: limit in ms. Resolves
/// `true` once the seek has settled, `false` if the limit elapses first.
pub const SEEK_AND_SETTLE: &str = r#"
const [video, position, limitMs, done] = arguments;
const onSeeked = () => { clearTimeout(timer); done(true); };
const timer = setTimeout(() => {
  video.removeEventListener("seeked", onSeeked);
  done(false);
}, limitMs);
video.addEventListener("seeked", onSeeked, { once: true });
video.currentTime = position;
"#;

pub const NATURAL_SIZE: &str = "return [arguments[0].videoWidth, arguments[0].videoHeight];";

/// `arguments[1..3]`: width, height. Returns a PNG data URL of the frame.
pub const SNAPSHOT: &str = r#"
const [video, width, height] = arguments;
const canvas = document.createElement("canvas");
canvas.width = width;
canvas.height = height;
canvas.getContext("2d").drawImage(video, 0, 0, width, height);
return canvas.toDataURL("image/png");
"#;
