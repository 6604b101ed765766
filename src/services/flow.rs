use crate::errors::AppError;
use crate::models::{
    format_price, Business, ConversationData, ConversationPatch, ConversationState, Flow, Step,
};
use crate::services::catalog;
use crate::services::conversation_store::ConversationStore;
use crate::services::scheduling::{canonical_phone, MIN_PHONE_DIGITS};

const GREETINGS: &[&str] = &["hola", "hi", "hello", "hey", "buenas", "buenos", "buen", "saludos"];
const AFFIRMATIVES: &[&str] = &["sí", "si", "yes"];

pub const APOLOGY: &str =
    "Lo sentimos, tuvimos un problema procesando tu mensaje. Por favor intenta de nuevo en un momento.";

const APPOINTMENTS_INFO: &str = "Para consultar, cambiar o cancelar tus citas escríbenos tu nombre completo y un asesor te atenderá en breve.\n\nEscribe \"menu\" para volver al inicio.";

/// What the engine decided to do with the stored conversation.
enum Update {
    Keep,
    Clear,
    Patch(ConversationPatch),
}

/// Runs one inbound message through the booking state machine and returns the
/// reply. Never fails: internal errors are logged and answered with
/// [`APOLOGY`], leaving the stored conversation as it was.
pub async fn process_message(
    store: &dyn ConversationStore,
    booking_base_url: &str,
    business: &Business,
    sender: &str,
    text: &str,
) -> String {
    match try_process(store, booking_base_url, business, sender, text).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(
                error = %e,
                from = %sender,
                business_id = %business.id,
                body = %text,
                "flow engine failed"
            );
            APOLOGY.to_string()
        }
    }
}

async fn try_process(
    store: &dyn ConversationStore,
    booking_base_url: &str,
    business: &Business,
    sender: &str,
    text: &str,
) -> Result<String, AppError> {
    let text = text.trim();
    let norm = normalize(text);

    if is_greeting(&norm) || is_menu_request(&norm) {
        store.clear(sender).await?;
        tracing::info!(from = %sender, business_id = %business.id, "conversation reset");
        return Ok(main_menu(business));
    }

    let conv = store.get(sender).await?;
    tracing::info!(
        from = %sender,
        business_id = %business.id,
        flow = conv.flow.map(|f| f.as_str()).unwrap_or("none"),
        step = conv.step.map(|s| s.as_str()).unwrap_or("none"),
        "processing message"
    );

    let (reply, update) = match (conv.flow, conv.step) {
        (None, _) => idle(business, &norm),

        (Some(Flow::SelectService), Some(Step::ShowMenu)) => {
            let chosen = norm
                .parse::<usize>()
                .ok()
                .and_then(|n| catalog::lookup(&business.services, n));
            match chosen {
                Some(service) => (
                    format!(
                        "Elegiste {}.\nPrecio: {}\nDuración: {} minutos\n\n¿Deseas agendar este servicio? Responde \"sí\" para continuar.",
                        service.name,
                        format_price(service.price),
                        service.duration_minutes
                    ),
                    Update::Patch(
                        ConversationPatch::goto(Flow::SelectService, Step::ConfirmService)
                            .with_data(ConversationData {
                                service: Some(service.name.clone()),
                                price: Some(service.price),
                                duration_minutes: Some(service.duration_minutes),
                                ..Default::default()
                            }),
                    ),
                ),
                None => (catalog_menu(business), Update::Keep),
            }
        }

        (Some(Flow::SelectService), Some(Step::ConfirmService)) => {
            if words(&norm).any(|w| AFFIRMATIVES.contains(&w)) {
                (
                    "¡Perfecto! ¿A nombre de quién agendamos la cita?".to_string(),
                    Update::Patch(
                        ConversationPatch::goto(Flow::Appointment, Step::GetName).with_data(
                            ConversationData {
                                service: conv.data.service.clone(),
                                price: conv.data.price,
                                duration_minutes: conv.data.duration_minutes,
                                ..Default::default()
                            },
                        ),
                    ),
                )
            } else {
                (main_menu(business), Update::Clear)
            }
        }

        (Some(Flow::Appointment), Some(Step::GetName)) => {
            if text.is_empty() {
                (
                    "¿A nombre de quién agendamos la cita?".to_string(),
                    Update::Keep,
                )
            } else {
                (
                    format!("Gracias, {text}. ¿Cuál es tu número de teléfono a 10 dígitos?"),
                    Update::Patch(
                        ConversationPatch::goto(Flow::Appointment, Step::GetPhone).with_data(
                            ConversationData {
                                client_name: Some(text.to_string()),
                                ..Default::default()
                            },
                        ),
                    ),
                )
            }
        }

        (Some(Flow::Appointment), Some(Step::GetPhone)) => {
            let phone = canonical_phone(text);
            if phone.len() < MIN_PHONE_DIGITS {
                (
                    format!(
                        "El número debe tener al menos {MIN_PHONE_DIGITS} dígitos. Por favor escríbelo de nuevo."
                    ),
                    Update::Keep,
                )
            } else {
                let mut data = conv.data.clone();
                data.phone = Some(phone.clone());
                (
                    handoff_reply(booking_base_url, business, &data)?,
                    Update::Patch(
                        ConversationPatch::goto(Flow::Appointment, Step::SelectDate).with_data(
                            ConversationData {
                                phone: Some(phone),
                                ..Default::default()
                            },
                        ),
                    ),
                )
            }
        }

        (Some(Flow::Appointment), Some(Step::SelectDate)) => {
            (handoff_reply(booking_base_url, business, &conv.data)?, Update::Keep)
        }

        (flow, step) => {
            return Err(AppError::Logic(format!(
                "unexpected conversation position {flow:?}/{step:?}"
            )))
        }
    };

    apply(store, sender, update).await?;
    Ok(reply)
}

fn idle(business: &Business, norm: &str) -> (String, Update) {
    match norm {
        "1" => enter_catalog(business),
        _ if norm.contains("agendar") => enter_catalog(business),
        "2" => (APPOINTMENTS_INFO.to_string(), Update::Keep),
        "3" => (services_info(business), Update::Keep),
        "4" => (hours_info(business), Update::Keep),
        "5" => (location_info(business), Update::Keep),
        _ => (main_menu(business), Update::Keep),
    }
}

fn enter_catalog(business: &Business) -> (String, Update) {
    (
        catalog_menu(business),
        Update::Patch(ConversationPatch::goto(Flow::SelectService, Step::ShowMenu)),
    )
}

async fn apply(store: &dyn ConversationStore, sender: &str, update: Update) -> Result<(), AppError> {
    match update {
        Update::Keep => Ok(()),
        Update::Clear => store.clear(sender).await,
        Update::Patch(patch) => store.set(sender, patch).await.map(|_: ConversationState| ()),
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .trim_matches(|c: char| matches!(c, '.' | ',' | '!' | '¡' | '?' | '¿'))
        .trim()
        .to_string()
}

fn words(norm: &str) -> impl Iterator<Item = &str> {
    norm.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
}

fn is_greeting(norm: &str) -> bool {
    words(norm).next().is_some_and(|w| GREETINGS.contains(&w))
}

fn is_menu_request(norm: &str) -> bool {
    matches!(norm, "menu" | "menú" | "0")
}

pub fn main_menu(business: &Business) -> String {
    format!(
        "¡Hola! Bienvenido a {}. ¿En qué podemos ayudarte?\n\n\
         1. Agendar una cita\n\
         2. Mis citas\n\
         3. Servicios y precios\n\
         4. Horarios\n\
         5. Ubicación\n\n\
         Responde con el número de la opción. Escribe \"menu\" en cualquier momento para volver aquí.",
        business.name
    )
}

fn catalog_menu(business: &Business) -> String {
    let menu = catalog::render_menu(&business.services);
    if menu.is_empty() {
        return "Por el momento no hay servicios disponibles para agendar.\n\nEscribe \"menu\" para volver al inicio.".to_string();
    }
    format!("Estos son nuestros servicios:\n\n{menu}\n\nResponde con el número del servicio que deseas.")
}

fn services_info(business: &Business) -> String {
    let list = catalog::render_price_list(&business.services);
    if list.is_empty() {
        return "Por el momento no tenemos servicios publicados.\n\nEscribe \"menu\" para volver al inicio.".to_string();
    }
    format!("Nuestros servicios:\n\n{list}\n\nResponde 1 para agendar una cita.")
}

fn hours_info(business: &Business) -> String {
    let hours = business.hours.to_human_readable();
    if hours.is_empty() {
        return "Consulta nuestros horarios directamente en el negocio.\n\nEscribe \"menu\" para volver al inicio.".to_string();
    }
    format!("Nuestros horarios de atención:\n\n{hours}\n\nEscribe \"menu\" para volver al inicio.")
}

fn location_info(business: &Business) -> String {
    match business.address.as_deref().filter(|a| !a.trim().is_empty()) {
        Some(address) => {
            format!("Nos encontramos en:\n{address}\n\nEscribe \"menu\" para volver al inicio.")
        }
        None => "Pregúntanos por nuestra ubicación y con gusto te la compartimos.\n\nEscribe \"menu\" para volver al inicio.".to_string(),
    }
}

/// Link to the web calendar, prefilled with everything gathered in chat.
pub fn handoff_url(
    booking_base_url: &str,
    business: &Business,
    data: &ConversationData,
) -> Result<String, AppError> {
    let url = reqwest::Url::parse_with_params(
        booking_base_url,
        &[
            ("business", business.id.as_str()),
            ("name", data.client_name.as_deref().unwrap_or_default()),
            ("service", data.service.as_deref().unwrap_or_default()),
            ("phone", data.phone.as_deref().unwrap_or_default()),
        ],
    )
    .map_err(|e| AppError::Logic(format!("invalid booking base url {booking_base_url:?}: {e}")))?;
    Ok(url.to_string())
}

fn handoff_reply(
    booking_base_url: &str,
    business: &Business,
    data: &ConversationData,
) -> Result<String, AppError> {
    let url = handoff_url(booking_base_url, business, data)?;
    Ok(format!(
        "¡Listo, {}! Elige la fecha y hora de tu cita de {} aquí:\n{url}",
        data.client_name.as_deref().unwrap_or_default(),
        data.service.as_deref().unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::db::queries::tests::sample_business;
    use crate::services::conversation_store::InMemoryConversationStore;

    const BASE: &str = "https://agenda.example.com/agendar";
    const SENDER: &str = "whatsapp:+5215511112222";

    async fn send(store: &InMemoryConversationStore, business: &Business, text: &str) -> String {
        process_message(store, BASE, business, SENDER, text).await
    }

    async fn position(store: &InMemoryConversationStore) -> (Option<Flow>, Option<Step>) {
        let state = store.get(SENDER).await.unwrap();
        (state.flow, state.step)
    }

    fn query_pairs(reply: &str) -> Vec<(String, String)> {
        let url = reply.lines().last().unwrap();
        reqwest::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[tokio::test]
    async fn test_full_booking_scenario() {
        let store = InMemoryConversationStore::new();
        let business = sample_business("B", "+15550001111");

        let reply = send(&store, &business, "hola").await;
        assert!(reply.contains("1. Agendar una cita"));
        assert!(store.get(SENDER).await.unwrap().is_idle());

        let reply = send(&store, &business, "1").await;
        assert!(reply.contains("1. Cleaning"));
        assert!(reply.contains("2. Extraction"));
        assert_eq!(position(&store).await, (Some(Flow::SelectService), Some(Step::ShowMenu)));

        let reply = send(&store, &business, "1").await;
        assert!(reply.contains("$500"));
        assert!(reply.contains("30 minutos"));
        assert_eq!(
            position(&store).await,
            (Some(Flow::SelectService), Some(Step::ConfirmService))
        );

        let reply = send(&store, &business, "si").await;
        assert!(reply.contains("nombre"));
        assert_eq!(position(&store).await, (Some(Flow::Appointment), Some(Step::GetName)));

        let reply = send(&store, &business, "Jane Doe").await;
        assert!(reply.contains("teléfono"));
        assert_eq!(position(&store).await, (Some(Flow::Appointment), Some(Step::GetPhone)));

        let reply = send(&store, &business, "555-123-4567").await;
        let state = store.get(SENDER).await.unwrap();
        assert_eq!(state.step, Some(Step::SelectDate));
        assert_eq!(state.data.phone.as_deref(), Some("5551234567"));
        assert_eq!(state.data.client_name.as_deref(), Some("Jane Doe"));
        assert_eq!(state.data.price, Some(500.0));

        assert_eq!(
            query_pairs(&reply),
            vec![
                ("business".to_string(), "B".to_string()),
                ("name".to_string(), "Jane Doe".to_string()),
                ("service".to_string(), "Cleaning".to_string()),
                ("phone".to_string(), "5551234567".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_idle_info_digits_never_address_catalog() {
        let store = InMemoryConversationStore::new();
        let mut business = sample_business("B", "+15550001111");

        for services in [business.services.clone(), vec![]] {
            business.services = services;
            assert_eq!(send(&store, &business, "2").await, APPOINTMENTS_INFO);
            let services_reply = send(&store, &business, "3").await;
            if business.services.is_empty() {
                assert!(services_reply.contains("no tenemos servicios"));
            } else {
                assert!(services_reply.contains("Cleaning — $500 (30 min)"));
            }
            assert!(send(&store, &business, "4").await.contains("Lunes: 09:00-18:00"));
            assert!(send(&store, &business, "5").await.contains("Av. Reforma 1"));
            assert!(store.get(SENDER).await.unwrap().is_idle());
        }
    }

    #[tokio::test]
    async fn test_agendar_enters_catalog() {
        let store = InMemoryConversationStore::new();
        let business = sample_business("B", "+15550001111");

        let reply = send(&store, &business, "Quiero agendar una cita").await;
        assert!(reply.contains("1. Cleaning"));
        assert_eq!(position(&store).await, (Some(Flow::SelectService), Some(Step::ShowMenu)));
    }

    #[tokio::test]
    async fn test_unknown_idle_input_shows_main_menu() {
        let store = InMemoryConversationStore::new();
        let business = sample_business("B", "+15550001111");

        assert_eq!(send(&store, &business, "qué tal").await, main_menu(&business));
        assert!(store.get(SENDER).await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_reset_tokens_from_every_state() {
        let business = sample_business("B", "+15550001111");
        let paths: &[&[&str]] = &[
            &[],
            &["1"],
            &["1", "2"],
            &["1", "2", "sí"],
            &["1", "2", "sí", "Juan"],
            &["1", "2", "sí", "Juan", "5512345678"],
        ];

        for token in ["hola", "Buenas tardes", "menu", "Menú", "0"] {
            for path in paths {
                let store = InMemoryConversationStore::new();
                for msg in *path {
                    send(&store, &business, msg).await;
                }
                let reply = send(&store, &business, token).await;
                assert_eq!(reply, main_menu(&business), "token {token:?} after {path:?}");
                let state = store.get(SENDER).await.unwrap();
                assert!(state.is_idle());
                assert_eq!(state.step, None);
                assert_eq!(state.data, ConversationData::default());
            }
        }
    }

    #[tokio::test]
    async fn test_out_of_range_choice_reemits_menu() {
        let store = InMemoryConversationStore::new();
        let business = sample_business("B", "+15550001111");
        send(&store, &business, "1").await;

        for input in ["3", "99", "limpieza"] {
            let reply = send(&store, &business, input).await;
            assert!(reply.contains("1. Cleaning"));
            assert_eq!(position(&store).await, (Some(Flow::SelectService), Some(Step::ShowMenu)));
        }
    }

    #[tokio::test]
    async fn test_choice_resolves_against_current_catalog() {
        let store = InMemoryConversationStore::new();
        let mut business = sample_business("B", "+15550001111");
        let menu = send(&store, &business, "1").await;
        assert!(menu.contains("1. Cleaning"));

        business.services[0].active = false;
        let reply = send(&store, &business, "1").await;
        assert!(reply.contains("Extraction"));
        assert_eq!(
            store.get(SENDER).await.unwrap().data.service.as_deref(),
            Some("Extraction")
        );
    }

    #[tokio::test]
    async fn test_declining_confirmation_returns_idle() {
        let store = InMemoryConversationStore::new();
        let business = sample_business("B", "+15550001111");
        send(&store, &business, "1").await;
        send(&store, &business, "2").await;

        let reply = send(&store, &business, "no gracias").await;
        assert_eq!(reply, main_menu(&business));
        let state = store.get(SENDER).await.unwrap();
        assert!(state.is_idle());
        assert_eq!(state.data, ConversationData::default());
    }

    #[tokio::test]
    async fn test_short_phone_never_advances() {
        let store = InMemoryConversationStore::new();
        let business = sample_business("B", "+15550001111");
        for msg in ["1", "1", "yes", "Jane"] {
            send(&store, &business, msg).await;
        }

        for input in ["555-123-456", "abc", "12 34 56 78 9"] {
            let reply = send(&store, &business, input).await;
            assert!(reply.contains("10 dígitos"));
            assert_eq!(position(&store).await, (Some(Flow::Appointment), Some(Step::GetPhone)));
            assert_eq!(store.get(SENDER).await.unwrap().data.phone, None);
        }

        send(&store, &business, "+52 (55) 1234-5678").await;
        let state = store.get(SENDER).await.unwrap();
        assert_eq!(state.step, Some(Step::SelectDate));
        let phone = state.data.phone.unwrap();
        assert_eq!(phone, "525512345678");
        assert!(phone.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_select_date_repeats_handoff() {
        let store = InMemoryConversationStore::new();
        let business = sample_business("B", "+15550001111");
        let mut last = String::new();
        for msg in ["1", "1", "sí", "Jane", "5551234567"] {
            last = send(&store, &business, msg).await;
        }

        let again = send(&store, &business, "gracias").await;
        assert_eq!(again, last);
        assert_eq!(position(&store).await, (Some(Flow::Appointment), Some(Step::SelectDate)));
    }

    #[tokio::test]
    async fn test_fault_leaves_state_untouched() {
        let store = InMemoryConversationStore::new();
        let business = sample_business("B", "+15550001111");
        for msg in ["1", "1", "sí", "Jane"] {
            send(&store, &business, msg).await;
        }

        let reply = process_message(&store, "not a url", &business, SENDER, "5551234567").await;
        assert_eq!(reply, APOLOGY);
        let state = store.get(SENDER).await.unwrap();
        assert_eq!(state.step, Some(Step::GetPhone));
        assert_eq!(state.data.phone, None);

        // Same input succeeds once the fault is gone.
        let reply = send(&store, &business, "5551234567").await;
        assert!(reply.contains(BASE));
    }

    struct UnavailableStore;

    #[async_trait]
    impl ConversationStore for UnavailableStore {
        async fn get(&self, _key: &str) -> Result<ConversationState, AppError> {
            Err(AppError::Transient("cache offline".into()))
        }
        async fn set(
            &self,
            _key: &str,
            _patch: ConversationPatch,
        ) -> Result<ConversationState, AppError> {
            Err(AppError::Transient("cache offline".into()))
        }
        async fn clear(&self, _key: &str) -> Result<(), AppError> {
            Err(AppError::Transient("cache offline".into()))
        }
    }

    #[tokio::test]
    async fn test_store_outage_yields_apology() {
        let business = sample_business("B", "+15550001111");
        for text in ["hola", "1"] {
            let reply = process_message(&UnavailableStore, BASE, &business, SENDER, text).await;
            assert_eq!(reply, APOLOGY);
        }
    }
}
