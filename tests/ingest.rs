use dynabat::{
    config::{MAX_PRICES, TARIFF_API_URL},
    datetime::parse_iso_hour,
    error::{FetchError, ParseError, TransportError},
    ingest::{apply_fetch, request_url},
    model::PriceClass,
    prices::PriceStore,
};

const TARIFFS_80H: &[u8] = include_bytes!("fixtures/tariffs_80h.json");

fn hour(timestamp: &str) -> u32 {
    parse_iso_hour(timestamp).unwrap()
}

#[test]
fn oversized_payload_fills_table_and_drops_the_rest() {
    let mut store = PriceStore::new();
    assert_eq!(apply_fetch(&mut store, Ok(TARIFFS_80H)), Ok(MAX_PRICES));
    assert_eq!(store.len(), MAX_PRICES);

    let first = hour("2025-12-13T23:00:00.000Z");
    let last = hour("2025-12-16T22:00:00.000Z");
    assert_eq!(store.records()[0].hour, first);
    assert_eq!(store.records()[MAX_PRICES - 1].hour, last);
    assert_eq!(store.lookup(last + 1), None);
    assert_eq!(store.count_future_hours(first), MAX_PRICES - 1);
}

#[test]
fn extremes_of_fixture_window() {
    let mut store = PriceStore::new();
    apply_fetch(&mut store, Ok(TARIFFS_80H)).unwrap();

    // the negative price sits in record 76 and must not count
    assert_eq!(store.lowest(), Some(3));
    assert_eq!(store.highest(), Some(61));
    assert_eq!(store.average(), 24);

    let cheapest = hour("2025-12-14T04:00:00.000Z");
    let dearest = hour("2025-12-14T18:00:00.000Z");
    assert_eq!(store.classify(cheapest), PriceClass::Cheapest);
    assert_eq!(store.classify(dearest), PriceClass::MostExpensive);
    assert_eq!(
        store.classify(hour("2025-12-14T10:00:00.000Z")),
        PriceClass::Neutral
    );
}

#[test]
fn average_moves_once_per_successful_fetch() {
    let mut store = PriceStore::new();
    apply_fetch(&mut store, Ok(TARIFFS_80H)).unwrap();
    let after_first = store.average();

    let _ = apply_fetch(&mut store, Err(TransportError::Connect));
    let _ = apply_fetch(&mut store, Ok(b"{\"data\":".as_slice()));
    assert_eq!(store.average(), after_first);

    let before = store.clone();
    assert_eq!(
        apply_fetch(&mut store, Ok(br#"{"result":"maintenance"}"#.as_slice())),
        Err(FetchError::Parse(ParseError::Json))
    );
    assert_eq!(store.records(), before.records());
}

#[test]
fn request_for_fixture_window() {
    let url = request_url(TARIFF_API_URL, hour("2025-12-13T23:00:00.000Z")).unwrap();
    assert!(url.ends_with("&startDate=2025-12-13T23:00:00.000Z&endDate=2025-12-15T23:00:00.000Z"));
}

#[test]
fn debug_dump_shows_fixture() {
    let mut store = PriceStore::new();
    apply_fetch(&mut store, Ok(TARIFFS_80H)).unwrap();

    let mut dump = String::new();
    store.write_debug(&mut dump).unwrap();
    assert!(dump.starts_with("lowest: 3\nhighest: 61\ncapacity: 72\naverage: 24\nprices:\n"));
    assert!(dump.contains(&format!("\n5 {} 3\n", hour("2025-12-14T04:00:00.000Z"))));
    assert!(!dump.contains(" - -"));
}
