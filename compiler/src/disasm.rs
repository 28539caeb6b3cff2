//! A one-shot disassembler for the `--dis` CLI flag (spec §6).
//!
//! Walks a compiled [`Image`] front to back, printing one line per
//! instruction. This is diagnostic output only — the VM itself decodes the
//! same bytes independently in `tiny_runtime::vm`.

use std::fmt::Write as _;
use tiny_core::image::Reader;
use tiny_core::{Image, Tag};

/// Render every instruction in `image` as text, one per line.
pub fn disassemble(image: &Image, strings: &crate::pool::StringPool) -> String {
    let mut out = String::new();
    let mut r = Reader::at(image, 0);
    while !r.is_end() {
        let pc = r.pc();
        let Some(tag) = r.peek_tag() else {
            let _ = writeln!(out, "{pc:6}  <bad byte>");
            break;
        };
        r.read_u8();
        let _ = write!(out, "{pc:6}  {tag:?}");
        match tag {
            Tag::PushInt => {
                let _ = write!(out, " {}", r.read_i32());
            }
            Tag::PushFloat => {
                let _ = write!(out, " {}", r.read_f32());
            }
            Tag::PushStringShort => {
                let idx = r.read_u8() as u32;
                let _ = write!(out, " [{idx}] {:?}", strings.get(idx));
            }
            Tag::PushString => {
                let idx = r.read_u32();
                let _ = write!(out, " [{idx}] {:?}", strings.get(idx));
            }
            Tag::PushNullN | Tag::PushStruct | Tag::StructGet | Tag::StructSet => {
                let _ = write!(out, " {}", r.read_u8());
            }
            Tag::Get | Tag::Set | Tag::File | Tag::Line => {
                let _ = write!(out, " {}", r.read_u32());
            }
            Tag::GetLocal | Tag::SetLocal | Tag::Goto => {
                let _ = write!(out, " {}", r.read_i32());
            }
            Tag::GotoFalse => {
                let _ = write!(out, " {}", r.read_i32());
            }
            Tag::Call | Tag::Callf => {
                let nargs = r.read_u8();
                let idx = r.read_u32();
                let _ = write!(out, " nargs={nargs} idx={idx}");
            }
            _ => {}
        }
        out.push('\n');
    }
    out
}
