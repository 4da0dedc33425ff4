//! Inline-script instructions that patch streamed content into place.
//!
//! Each instruction calls a small runtime helper. A helper's body is sent the
//! first time it is needed in a response and only the call afterwards; the
//! [`Instructions`] bitmask records which bodies were already sent.

use crate::chunk::ChunkBuffer;
use crate::escape::{escape_attr, escape_json_for_script, script_string_literal};
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
	/// Runtime helpers already emitted in this response.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
	pub struct Instructions: u8 {
		/// `$RS`: move a hidden segment over its placeholder.
		const COMPLETE_SEGMENT = 1 << 0;
		/// `$RC`: swap a boundary's fallback for its content.
		const COMPLETE_BOUNDARY = 1 << 1;
		/// `$RX`: hand a boundary to client rendering.
		const CLIENT_RENDER = 1 << 2;
		/// `$RR`: load stylesheets, then complete a boundary.
		const STYLE_INSERTION = 1 << 3;
	}
}

/// Moves the children of hidden container `s` in front of placeholder `p`,
/// then removes both.
pub const COMPLETE_SEGMENT_FN: &str = "$RS=function(s,p){s=document.getElementById(s);p=document.getElementById(p);if(!s||!p)return;s.parentNode.removeChild(s);while(s.firstChild)p.parentNode.insertBefore(s.firstChild,p);p.parentNode.removeChild(p)};";

/// Removes the fallback between the boundary's start marker and its matching
/// end marker, inserts the content of container `s`, and flips the marker to
/// the completed state.
pub const COMPLETE_BOUNDARY_FN: &str = "$RC=function(b,s){var t=document.getElementById(b),c=document.getElementById(s);if(!t||!c)return;c.parentNode.removeChild(c);var m=t.previousSibling,p=m.parentNode,n=t,d=0;while(n){if(n.nodeType===8){var x=n.data;if(x==='/$'){if(d===0)break;d--}else if(x==='$'||x==='$?'||x==='$!')d++}var r=n.nextSibling;p.removeChild(n);n=r}while(c.firstChild)p.insertBefore(c.firstChild,n);m.data='$';m._ssrRetry&&m._ssrRetry()};";

/// Marks a boundary as client rendered and records the error digest.
pub const CLIENT_RENDER_FN: &str = "$RX=function(b,d){var t=document.getElementById(b);if(!t)return;var m=t.previousSibling;m.data='$!';d&&(t.dataset.dgst=d);m._ssrRetry&&m._ssrRetry()};";

/// Inserts the boundary's stylesheets, waits for them to load, then calls
/// `$RC`. A stylesheet that fails to load client-renders the boundary.
pub const STYLE_INSERTION_FN: &str = "$RR=function(b,s,l){var q=[];l.forEach(function(e){if(document.querySelector('link[rel=\"stylesheet\"][href=\"'+e[0]+'\"]'))return;var k=document.createElement('link');k.rel='stylesheet';k.href=e[0];k.setAttribute('data-precedence',e[1]);q.push(new Promise(function(y,n){k.onload=y;k.onerror=n}));document.head.appendChild(k)});Promise.all(q).then(function(){$RC(b,s)},function(){$RX(b,'')})};";

/// A stylesheet a boundary depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylesheetRef {
	/// Stylesheet URL.
	pub href: String,
	/// Precedence group.
	pub precedence: String,
}

fn write_script_start(buf: &mut ChunkBuffer, nonce: Option<&str>) {
	match nonce {
		Some(nonce) => {
			buf.push_static("<script nonce=\"");
			buf.push_str(&escape_attr(nonce));
			buf.push_static("\">");
		}
		None => buf.push_static("<script>"),
	}
}

fn write_helper(buf: &mut ChunkBuffer, sent: &mut Instructions, flag: Instructions, body: &'static str) {
	if !sent.contains(flag) {
		sent.insert(flag);
		buf.push_static(body);
	}
}

/// `$RS("S:n","P:n")`
pub fn write_complete_segment(
	buf: &mut ChunkBuffer,
	sent: &mut Instructions,
	nonce: Option<&str>,
	segment_id: &str,
	placeholder_id: &str,
) {
	write_script_start(buf, nonce);
	write_helper(buf, sent, Instructions::COMPLETE_SEGMENT, COMPLETE_SEGMENT_FN);
	buf.push(format!(
		"$RS({},{})",
		script_string_literal(segment_id),
		script_string_literal(placeholder_id)
	));
	buf.push_static("</script>");
}

/// `$RC("B:n","S:n")`, or `$RR("B:n","S:n",[[href,precedence],…])` when the
/// content depends on stylesheets that have not been sent yet.
pub fn write_complete_boundary(
	buf: &mut ChunkBuffer,
	sent: &mut Instructions,
	nonce: Option<&str>,
	boundary_id: &str,
	segment_id: &str,
	stylesheets: &[StylesheetRef],
) {
	write_script_start(buf, nonce);
	write_helper(buf, sent, Instructions::COMPLETE_BOUNDARY, COMPLETE_BOUNDARY_FN);
	if stylesheets.is_empty() {
		buf.push(format!(
			"$RC({},{})",
			script_string_literal(boundary_id),
			script_string_literal(segment_id)
		));
	} else {
		write_helper(buf, sent, Instructions::CLIENT_RENDER, CLIENT_RENDER_FN);
		write_helper(buf, sent, Instructions::STYLE_INSERTION, STYLE_INSERTION_FN);
		let pairs: Vec<[&str; 2]> = stylesheets
			.iter()
			.map(|s| [s.href.as_str(), s.precedence.as_str()])
			.collect();
		// A list of string pairs always serializes.
		let json = serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string());
		buf.push(format!(
			"$RR({},{},{})",
			script_string_literal(boundary_id),
			script_string_literal(segment_id),
			escape_json_for_script(&json)
		));
	}
	buf.push_static("</script>");
}

/// `$RX("B:n","digest")`
pub fn write_client_render_boundary(
	buf: &mut ChunkBuffer,
	sent: &mut Instructions,
	nonce: Option<&str>,
	boundary_id: &str,
	digest: Option<&str>,
) {
	write_script_start(buf, nonce);
	write_helper(buf, sent, Instructions::CLIENT_RENDER, CLIENT_RENDER_FN);
	match digest {
		Some(digest) => buf.push(format!(
			"$RX({},{})",
			script_string_literal(boundary_id),
			script_string_literal(digest)
		)),
		None => buf.push(format!("$RX({})", script_string_literal(boundary_id))),
	}
	buf.push_static("</script>");
}
