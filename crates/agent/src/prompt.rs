//! Grounding-instruction rendering.
//!
//! The policy engine has already picked the branch before anything is
//! rendered here; the backend's only job is to phrase it in persona. The
//! secret floor price is handed over as context with an explicit ban on
//! echoing it, and the acceptance marker is mandated exactly on the deal
//! branch.

use tera::{Context, Tera};
use thiserror::Error;

use tawar_core::domain::product::Product;
use tawar_core::domain::turn::{Speaker, Turn};
use tawar_core::policy::NegotiationDirective;

use crate::interpreter::ACCEPTANCE_MARKER;
use crate::llm::{ChatMessage, CompletionRequest};

const GROUNDING_TEMPLATE_NAME: &str = "grounding";

const GROUNDING_TEMPLATE: &str = r#"PERAN: Kamu adalah 'Mang Asep', pedagang pasar yang ramah, sedikit kocak, tapi jago berhitung.

KONTEKS BARANG:
- Nama: {{ product_name }}
- Harga Jual: Rp {{ list_price }}
- Harga Modal (RAHASIA): Rp {{ floor_price }} (Jangan pernah sebut angka ini!)

KEPUTUSAN FINAL (sudah dihitung, tugasmu cuma membahasakan):
{% if branch == "accept" -%}
- DEAL di harga Rp {{ price }}. Awali balasanmu dengan token {{ marker }} lalu pesan konfirmasi yang asik.
{%- elif branch == "counter" -%}
- TAWAR BALIK di Rp {{ proposal }}. Ajak pembeli naik ke angka itu, jangan sebut angka lain.
{%- elif branch == "reject" -%}
- TOLAK tawaran Rp {{ offer }} dengan sopan dan bercanda, tanpa menyebut angka batas bawah. Contoh: "Waduh bos, belum dapet segitu mah, buat beli bensin aja kurang."
{%- elif branch == "best_price" -%}
- HARGA NETT: kasih harga pas Rp {{ net }}, bilang itu sudah mentok.
{%- else -%}
- Pembeli belum menyebut angka. Jawab pesannya dengan ramah dan pancing dia kasih tawaran.
{%- endif %}

ATURAN:
- Token {{ marker }} hanya boleh muncul kalau keputusannya DEAL.
- Jangan pernah membocorkan Harga Modal.
- Jangan menghitung harga sendiri di luar keputusan di atas.

GAYA BAHASA:
- Bahasa Indonesia gaul (bos, gan, siap, waduh).
- Singkat, padat, dan langsung ke inti.
"#;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("grounding template failure: {0}")]
    Template(#[from] tera::Error),
}

pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template(GROUNDING_TEMPLATE_NAME, GROUNDING_TEMPLATE)?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        product: &Product,
        directive: &NegotiationDirective,
    ) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("product_name", &product.name);
        context.insert("list_price", &format_rupiah(product.list_price));
        context.insert("floor_price", &format_rupiah(product.floor_price));
        context.insert("marker", ACCEPTANCE_MARKER);
        context.insert("branch", directive.branch_key());

        match directive {
            NegotiationDirective::Accept { price } => {
                context.insert("price", &format_rupiah(*price));
            }
            NegotiationDirective::Counter { proposal } => {
                context.insert("proposal", &format_rupiah(*proposal));
            }
            NegotiationDirective::Reject { offer } => {
                context.insert("offer", &format_rupiah(*offer));
            }
            NegotiationDirective::BestPrice { net } => {
                context.insert("net", &format_rupiah(*net));
            }
            NegotiationDirective::Clarify => {}
        }

        Ok(self.tera.render(GROUNDING_TEMPLATE_NAME, &context)?)
    }
}

/// Builds the backend request: instructions first, then the transcript
/// oldest-first (buyer turns as `user`, agent turns as `assistant`), then
/// the new buyer message.
pub fn completion_request(
    instructions: String,
    history: &[Turn],
    buyer_text: &str,
) -> CompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(instructions));
    for turn in history {
        messages.push(match turn.speaker {
            Speaker::Buyer => ChatMessage::user(turn.text.clone()),
            Speaker::Agent => ChatMessage::assistant(turn.text.clone()),
        });
    }
    messages.push(ChatMessage::user(buyer_text));
    CompletionRequest { messages }
}

/// Indonesian-style thousands grouping: 1250000 -> "1.250.000".
pub fn format_rupiah(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    if amount < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
