use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::invoice::invoice_callback,
        crate::api::pdf::generate_invoice_pdf,
        crate::api::pdf::invoice_pdf_callback,
        crate::api::email::email_invoice
    ),
    components(
        schemas(
            crate::models::PdfRenderRequest,
            crate::models::InvoiceCallback,
            crate::models::EmailCallback,
            crate::models::EmailJob,
            crate::models::Account,
            crate::models::Customer,
            crate::api::email::EmailInvoiceForm
        )
    ),
    tags(
        (name = "invoice", description = "Subscription and invoice lifecycle"),
        (name = "pdf", description = "Invoice rendering"),
        (name = "email", description = "Invoice delivery")
    )
)]
pub struct ApiDoc;
