//! Demo documents served by `GET /demo/sample-data`.

use serde_json::{Value, json};

pub const SAMPLE_EMAIL: &str = "From: frustrated.customer@example.com
To: support@company.com
Subject: URGENT: Broken Product - Need Immediate Refund

I am absolutely FURIOUS with your company! The product I received is completely broken and your customer service is TERRIBLE. I have been waiting 2 weeks for a response and this is UNACCEPTABLE!

I want to speak to your manager immediately and if this isn't resolved today, I will be contacting my lawyer!

This is the WORST experience I've ever had!";

pub const SAMPLE_PDF_TEXT: &str = "INVOICE #INV-2025-001
Date: May 30, 2025
Due Date: June 30, 2025

Bill To: ABC Company
Total Amount: $25,000.00

This invoice contains GDPR-regulated customer data.";

/// The sample invoice as a one-page PDF with a text layer.
pub fn sample_pdf() -> Vec<u8> {
    let lines: Vec<&str> = SAMPLE_PDF_TEXT.lines().collect();
    render_pdf(&lines)
}

/// Render ASCII lines onto a single Helvetica page.
pub fn render_pdf(lines: &[&str]) -> Vec<u8> {
    let mut content = String::from("BT /F1 12 Tf 72 720 Td\n");
    for line in lines {
        let escaped = line
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        content.push_str(&format!("({escaped}) Tj 0 -16 Td\n"));
    }
    content.push_str("ET");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{body}\nendobj\n", i + 1));
    }

    let xref_at = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.into_bytes()
}

pub fn sample_json() -> Value {
    json!({
        "transaction_id": "TXN-SUSPICIOUS-999",
        "amount": 15000,
        "user_id": "test_user",
        "timestamp": "2025-05-30T06:20:54Z",
        "flags": ["high_amount", "suspicious_user"]
    })
}

pub fn sample_data() -> Value {
    json!({
        "sample_email": SAMPLE_EMAIL,
        "sample_json": sample_json(),
        "sample_pdf_text": SAMPLE_PDF_TEXT,
        "endpoints": {
            "process_email": "POST /process/text with the sample_email",
            "process_json": "POST /process/text with the sample_json as string",
            "process_pdf": "POST /process/file?filename=invoice.pdf with the sample_pdf_text as body",
            "process_pdf_binary": "GET /demo/sample.pdf, then POST it to /process/file?filename=invoice.pdf",
        }
    })
}
