//! Strict typed binding of FatturaPA documents.
//!
//! The models cover the elements this crate imports; anything else in the
//! document is ignored. Required elements are non-optional, so a missing
//! number, an unparsable amount or a malformed date fails the binding and
//! hands the document to the tolerant parser.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::core::ImportError;

/// Transmission format, selecting the model to bind against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    /// FPA12: ordinary invoice to the public administration.
    Fpa12,
    /// FPR12: ordinary invoice between private parties.
    Fpr12,
    /// FSM10: simplified invoice.
    Fsm10,
}

impl SchemaVariant {
    /// Pick the variant for a `FormatoTrasmissione` code. Unknown codes bind
    /// as FPR12.
    pub fn from_format(code: Option<&str>) -> Self {
        match code.map(|c| c.trim().to_ascii_uppercase()).as_deref() {
            Some("FPA12") => Self::Fpa12,
            Some("FSM10") | Some("VFSM10") => Self::Fsm10,
            _ => Self::Fpr12,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Fpa12 => "FPA12",
            Self::Fpr12 => "FPR12",
            Self::Fsm10 => "FSM10",
        }
    }

    /// Length of `CodiceDestinatario` for this format.
    fn recipient_code_len(&self) -> usize {
        match self {
            Self::Fpa12 => 6,
            Self::Fpr12 | Self::Fsm10 => 7,
        }
    }
}

/// A successfully bound document.
#[derive(Debug, Clone)]
pub enum SchemaDocument {
    Ordinary(SchemaVariant, FatturaOrdinaria),
    Simplified(FatturaSemplificata),
}

/// Bind `xml` against the model for `variant`.
pub fn parse_schema(xml: &str, variant: SchemaVariant) -> Result<SchemaDocument, ImportError> {
    let binding = |e: quick_xml::de::DeError| {
        ImportError::Parse(format!("{} binding failed: {e}", variant.code()))
    };
    match variant {
        SchemaVariant::Fsm10 => {
            let doc: FatturaSemplificata = quick_xml::de::from_str(xml).map_err(binding)?;
            check_transmission(variant, &doc.versione, &doc.header.dati_trasmissione)?;
            if doc.bodies.is_empty() {
                return Err(missing(variant, "FatturaElettronicaBody"));
            }
            if doc.bodies.iter().any(|b| b.dati_beni_servizi.is_empty()) {
                return Err(missing(variant, "DatiBeniServizi"));
            }
            Ok(SchemaDocument::Simplified(doc))
        }
        SchemaVariant::Fpa12 | SchemaVariant::Fpr12 => {
            let doc: FatturaOrdinaria = quick_xml::de::from_str(xml).map_err(binding)?;
            check_transmission(variant, &doc.versione, &doc.header.dati_trasmissione)?;
            if doc.bodies.is_empty() {
                return Err(missing(variant, "FatturaElettronicaBody"));
            }
            Ok(SchemaDocument::Ordinary(variant, doc))
        }
    }
}

fn missing(variant: SchemaVariant, element: &str) -> ImportError {
    ImportError::Parse(format!("{}: missing {element}", variant.code()))
}

fn check_transmission(
    variant: SchemaVariant,
    versione: &str,
    dt: &DatiTrasmissione,
) -> Result<(), ImportError> {
    if !versione.eq_ignore_ascii_case(variant.code()) {
        return Err(ImportError::Parse(format!(
            "{}: root versione is {versione:?}",
            variant.code()
        )));
    }
    if !dt.formato_trasmissione.eq_ignore_ascii_case(variant.code()) {
        return Err(ImportError::Parse(format!(
            "{}: FormatoTrasmissione is {:?}",
            variant.code(),
            dt.formato_trasmissione
        )));
    }
    if dt.codice_destinatario.trim().len() != variant.recipient_code_len() {
        return Err(ImportError::Parse(format!(
            "{}: CodiceDestinatario {:?} must have {} characters",
            variant.code(),
            dt.codice_destinatario,
            variant.recipient_code_len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatiTrasmissione {
    pub id_trasmittente: IdFiscale,
    pub progressivo_invio: String,
    pub formato_trasmissione: String,
    pub codice_destinatario: String,
    #[serde(rename = "PECDestinatario")]
    pub pec_destinatario: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdFiscale {
    pub id_paese: String,
    pub id_codice: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Anagrafica {
    pub denominazione: Option<String>,
    pub nome: Option<String>,
    pub cognome: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sede {
    pub indirizzo: String,
    pub numero_civico: Option<String>,
    #[serde(rename = "CAP")]
    pub cap: String,
    pub comune: String,
    pub provincia: Option<String>,
    pub nazione: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contatti {
    pub telefono: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Allegati {
    pub nome_attachment: String,
    pub algoritmo_compressione: Option<String>,
    pub formato_attachment: Option<String>,
    pub descrizione_attachment: Option<String>,
    pub algoritmo_crittografia: Option<String>,
    pub attachment: Option<String>,
}

// ---------------------------------------------------------------------------
// FPA12 / FPR12
// ---------------------------------------------------------------------------

/// Root `FatturaElettronica`.
#[derive(Debug, Clone, Deserialize)]
pub struct FatturaOrdinaria {
    #[serde(rename = "@versione")]
    pub versione: String,
    #[serde(rename = "FatturaElettronicaHeader")]
    pub header: Header,
    #[serde(rename = "FatturaElettronicaBody", default)]
    pub bodies: Vec<Body>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    pub dati_trasmissione: DatiTrasmissione,
    pub cedente_prestatore: CedentePrestatore,
    pub cessionario_committente: CessionarioCommittente,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatiAnagrafici {
    #[serde(rename = "IdFiscaleIVA")]
    pub id_fiscale_iva: Option<IdFiscale>,
    pub codice_fiscale: Option<String>,
    pub anagrafica: Anagrafica,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CedentePrestatore {
    pub dati_anagrafici: DatiAnagrafici,
    pub sede: Sede,
    pub contatti: Option<Contatti>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CessionarioCommittente {
    pub dati_anagrafici: DatiAnagrafici,
    pub sede: Sede,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Body {
    pub dati_generali: DatiGenerali,
    pub dati_beni_servizi: DatiBeniServizi,
    #[serde(default)]
    pub dati_pagamento: Vec<DatiPagamento>,
    #[serde(default)]
    pub allegati: Vec<Allegati>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatiGenerali {
    pub dati_generali_documento: DatiGeneraliDocumento,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatiGeneraliDocumento {
    pub tipo_documento: String,
    pub divisa: String,
    pub data: NaiveDate,
    pub numero: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub importo_totale_documento: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub arrotondamento: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatiBeniServizi {
    #[serde(default)]
    pub dettaglio_linee: Vec<DettaglioLinee>,
    #[serde(default)]
    pub dati_riepilogo: Vec<DatiRiepilogo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DettaglioLinee {
    pub numero_linea: u32,
    #[serde(default)]
    pub codice_articolo: Vec<CodiceArticolo>,
    pub descrizione: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub quantita: Option<Decimal>,
    pub unita_misura: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub prezzo_unitario: Decimal,
    #[serde(default)]
    pub sconto_maggiorazione: Vec<ScontoMaggiorazione>,
    #[serde(with = "rust_decimal::serde::str")]
    pub prezzo_totale: Decimal,
    #[serde(rename = "AliquotaIVA", with = "rust_decimal::serde::str")]
    pub aliquota_iva: Decimal,
    pub natura: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CodiceArticolo {
    pub codice_tipo: String,
    pub codice_valore: String,
}

/// `Tipo` is SC (discount) or MG (surcharge).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScontoMaggiorazione {
    pub tipo: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub percentuale: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub importo: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatiRiepilogo {
    #[serde(rename = "AliquotaIVA", with = "rust_decimal::serde::str")]
    pub aliquota_iva: Decimal,
    pub natura: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub imponibile_importo: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub imposta: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatiPagamento {
    pub condizioni_pagamento: String,
    #[serde(default)]
    pub dettaglio_pagamento: Vec<DettaglioPagamento>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DettaglioPagamento {
    pub modalita_pagamento: String,
    pub data_scadenza_pagamento: Option<NaiveDate>,
    #[serde(with = "rust_decimal::serde::str")]
    pub importo_pagamento: Decimal,
}

// ---------------------------------------------------------------------------
// FSM10
// ---------------------------------------------------------------------------

/// Root `FatturaElettronicaSemplificata`.
#[derive(Debug, Clone, Deserialize)]
pub struct FatturaSemplificata {
    #[serde(rename = "@versione")]
    pub versione: String,
    #[serde(rename = "FatturaElettronicaHeader")]
    pub header: HeaderSemplificato,
    #[serde(rename = "FatturaElettronicaBody", default)]
    pub bodies: Vec<BodySemplificato>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeaderSemplificato {
    pub dati_trasmissione: DatiTrasmissione,
    pub cedente_prestatore: CedenteSemplificato,
    pub cessionario_committente: CessionarioSemplificato,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CedenteSemplificato {
    #[serde(rename = "IdFiscaleIVA")]
    pub id_fiscale_iva: IdFiscale,
    pub codice_fiscale: Option<String>,
    pub denominazione: Option<String>,
    pub nome: Option<String>,
    pub cognome: Option<String>,
    pub sede: Sede,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CessionarioSemplificato {
    pub identificativi_fiscali: IdentificativiFiscali,
    pub altri_dati_identificativi: Option<AltriDatiIdentificativi>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdentificativiFiscali {
    #[serde(rename = "IdFiscaleIVA")]
    pub id_fiscale_iva: Option<IdFiscale>,
    pub codice_fiscale: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AltriDatiIdentificativi {
    pub denominazione: Option<String>,
    pub nome: Option<String>,
    pub cognome: Option<String>,
    pub sede: Option<Sede>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BodySemplificato {
    pub dati_generali: DatiGeneraliSemplificati,
    #[serde(default)]
    pub dati_beni_servizi: Vec<BeniServiziSemplificati>,
    #[serde(default)]
    pub allegati: Vec<Allegati>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatiGeneraliSemplificati {
    pub dati_generali_documento: DocumentoSemplificato,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentoSemplificato {
    pub tipo_documento: String,
    pub divisa: String,
    pub data: NaiveDate,
    pub numero: String,
}

/// One simplified line: `Importo` includes VAT.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BeniServiziSemplificati {
    pub descrizione: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub importo: Decimal,
    #[serde(rename = "DatiIVA")]
    pub dati_iva: DatiIva,
    pub natura: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatiIva {
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub imposta: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub aliquota: Option<Decimal>,
}
