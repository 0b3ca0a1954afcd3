use std::error;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use phf::phf_map;
use roxmltree::{Document, Node};

use model::{
    BoardingTip, Modification, ModificationKind, Platform, RollingStockUnit, Station, Train,
    TransferTip, TransportKind, TravelTip, Wing,
};

use crate::duration::parse_duration_seconds;

/// Current schema namespace; tried first.
pub const NS_CURRENT: &str = "urn:ndov:cdm:trein:reisinformatie:data:4";

/// Legacy schema namespace; accepted as a fallback.
pub const NS_LEGACY: &str = "urn:ndov:cdm:trein:reisinformatie:data:2";

/// Carrier names the feed is known to truncate.
static CARRIER_TABLE: phf::Map<&'static str, &'static str> = phf_map! {
    "NS Interna" => "NS International",
    "NS Int" => "NS International",
    "Locon Bene" => "Locon Benelux",
};

pub fn normalize_carrier(name: &str) -> String {
    match CARRIER_TABLE.get(name) {
        Some(full) => (*full).to_string(),
        None => name.to_owned(),
    }
}

#[derive(Debug)]
pub enum DecodeError {
    Xml(roxmltree::Error),
    MissingElement(&'static str),
    InvalidValue {
        element: &'static str,
        value: String,
    },
}

impl error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::Xml(why) => write!(f, "XML not well-formed: {}", why),
            DecodeError::MissingElement(name) => write!(f, "required element {} missing", name),
            DecodeError::InvalidValue { element, value } => {
                write!(f, "invalid value in {}: {:?}", element, value)
            }
        }
    }
}

impl From<roxmltree::Error> for DecodeError {
    fn from(why: roxmltree::Error) -> Self {
        DecodeError::Xml(why)
    }
}

/// An element handle that carries the document namespace along, so lookups
/// stay short. All DVS elements live in a single namespace per message.
#[derive(Clone, Copy)]
struct Cursor<'a, 'input> {
    node: Node<'a, 'input>,
    ns: &'static str,
}

impl<'a, 'input> Cursor<'a, 'input> {
    fn is_named(self, node: &Node, name: &str) -> bool {
        node.is_element()
            && node.tag_name().name() == name
            && node.tag_name().namespace() == Some(self.ns)
    }

    fn child(self, name: &'static str) -> Option<Cursor<'a, 'input>> {
        let ns = self.ns;
        self.node
            .children()
            .find(|node| self.is_named(node, name))
            .map(|node| Cursor { node, ns })
    }

    fn require(self, name: &'static str) -> Result<Cursor<'a, 'input>, DecodeError> {
        self.child(name).ok_or(DecodeError::MissingElement(name))
    }

    fn elements(self, name: &'static str) -> impl Iterator<Item = Cursor<'a, 'input>> {
        let ns = self.ns;
        self.node
            .children()
            .filter(move |node| self.is_named(node, name))
            .map(move |node| Cursor { node, ns })
    }

    /// Children with a matching InfoStatus attribute ("Gepland"/"Actueel").
    fn elements_with_status(
        self,
        name: &'static str,
        status: &'static str,
    ) -> impl Iterator<Item = Cursor<'a, 'input>> {
        self.elements(name)
            .filter(move |cursor| cursor.node.attribute("InfoStatus") == Some(status))
    }

    fn child_with_status(self, name: &'static str, status: &'static str) -> Option<Cursor<'a, 'input>> {
        self.elements_with_status(name, status).next()
    }

    fn text(self) -> String {
        self.node.text().unwrap_or_default().trim().to_owned()
    }

    fn require_text(self, name: &'static str) -> Result<String, DecodeError> {
        Ok(self.require(name)?.text())
    }

    fn optional_text(self, name: &'static str) -> Option<String> {
        let text = self.child(name)?.text();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Decode one decompressed DVS document into a [`Train`].
///
/// Required structure (product, departure staff, train node, identity and
/// departure times) fails the decode; every other missing field is left
/// unset and noted at debug level.
pub fn decode_train(xml: &str) -> Result<Train, DecodeError> {
    let document = Document::parse(xml)?;
    let root = document.root_element();

    let product = find_product(root, NS_CURRENT)
        .or_else(|| find_product(root, NS_LEGACY))
        .ok_or(DecodeError::MissingElement("ReisInformatieProductDVS"))?;

    let departure_staff = product.require("DynamischeVertrekStaat")?;
    let train_node = departure_staff.require("Trein")?;

    let message_timestamp = match product.node.attribute("TimeStamp") {
        Some(stamp) => parse_datetime("TimeStamp", stamp)?,
        None => return Err(DecodeError::MissingElement("TimeStamp")),
    };

    let trip_date_text = departure_staff.require_text("RitDatum")?;
    let trip_date = NaiveDate::parse_from_str(&trip_date_text, "%Y-%m-%d").map_err(|_| {
        DecodeError::InvalidValue {
            element: "RitDatum",
            value: trip_date_text.clone(),
        }
    })?;

    let kind_node = train_node.require("TreinSoort")?;
    let transport_kind = TransportKind {
        code: kind_node
            .node
            .attribute("Code")
            .ok_or(DecodeError::MissingElement("TreinSoort@Code"))?
            .to_owned(),
        name: kind_node.text(),
    };

    let wings = train_node
        .elements("TreinVleugel")
        .filter_map(|node| match decode_wing(node) {
            Ok(wing) => Some(wing),
            Err(why) => {
                log::debug!("dropping malformed wing: {}", why);
                None
            }
        })
        .collect();

    Ok(Train {
        trip_id: departure_staff.require_text("RitId")?,
        trip_station: decode_station(departure_staff.require("RitStation")?)?,
        trip_date,
        message_timestamp,
        train_number: train_node.require_text("TreinNummer")?,
        transport_kind,
        carrier: normalize_carrier(&train_node.require_text("Vervoerder")?),
        train_name: train_node.optional_text("TreinNaam"),
        status: train_node.require_text("TreinStatus")?,
        planned_departure: decode_departure_time(train_node, "Gepland")?,
        current_departure: decode_departure_time(train_node, "Actueel")?,
        exact_delay_seconds: decode_delay(train_node, "ExacteVertrekVertraging"),
        damped_delay_seconds: decode_delay(train_node, "GedempteVertrekVertraging"),
        planned_platform: decode_platforms(train_node, "TreinVertrekSpoor", "Gepland"),
        current_platform: decode_platforms(train_node, "TreinVertrekSpoor", "Actueel"),
        planned_destinations: decode_stations(
            train_node.elements_with_status("TreinEindBestemming", "Gepland"),
        ),
        current_destinations: decode_stations(
            train_node.elements_with_status("TreinEindBestemming", "Actueel"),
        ),
        planned_short_route: decode_short_route(train_node, "Gepland"),
        current_short_route: decode_short_route(train_node, "Actueel"),
        reservation_required: decode_flag(train_node, "Reserveren"),
        supplement_required: decode_flag(train_node, "Toeslag"),
        do_not_board: decode_flag(train_node, "NietInstappen"),
        special_ticket: decode_flag(train_node, "SpeciaalKaartje"),
        shunting: decode_flag(train_node, "RangeerBeweging"),
        rear_stays_behind: decode_flag(train_node, "AchterBlijvenAchtersteTreinDeel"),
        wings,
        modifications: decode_modifications(train_node),
        travel_tips: decode_travel_tips(train_node),
        boarding_tips: decode_boarding_tips(train_node),
        transfer_tips: decode_transfer_tips(train_node),
        synthetic: false,
        departed_timestamp: None,
    })
}

/// The product element is either the document root itself or one of its
/// direct children, depending on the surrounding envelope.
fn find_product<'a, 'input>(root: Node<'a, 'input>, ns: &'static str) -> Option<Cursor<'a, 'input>> {
    let is_product = |node: &Node| {
        node.is_element()
            && node.tag_name().name() == "ReisInformatieProductDVS"
            && node.tag_name().namespace() == Some(ns)
    };
    if is_product(&root) {
        return Some(Cursor { node: root, ns });
    }
    root.children()
        .find(is_product)
        .map(|node| Cursor { node, ns })
}

fn parse_datetime(element: &'static str, text: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(text)
        .map(|stamp| stamp.with_timezone(&Utc))
        .map_err(|_| DecodeError::InvalidValue {
            element,
            value: text.to_owned(),
        })
}

/// "J" means yes; every other value, including absence, means no.
fn parse_boolean(text: &str) -> bool {
    text == "J"
}

fn decode_departure_time(
    train_node: Cursor,
    status: &'static str,
) -> Result<DateTime<Utc>, DecodeError> {
    let node = train_node
        .child_with_status("VertrekTijd", status)
        .ok_or(DecodeError::MissingElement("VertrekTijd"))?;
    parse_datetime("VertrekTijd", &node.text())
}

fn decode_delay(train_node: Cursor, name: &'static str) -> i64 {
    let Some(node) = train_node.child(name) else {
        log::debug!("element {} missing, assuming no delay", name);
        return 0;
    };
    let text = node.text();
    match parse_duration_seconds(&text) {
        Some(seconds) => seconds,
        None => {
            log::debug!("unparseable duration in {}: {:?}", name, text);
            0
        }
    }
}

fn decode_flag(train_node: Cursor, name: &'static str) -> bool {
    match train_node.child(name) {
        Some(node) => parse_boolean(&node.text()),
        None => {
            log::debug!("element {} missing, assuming false", name);
            false
        }
    }
}

fn decode_station(cursor: Cursor) -> Result<Station, DecodeError> {
    let code = cursor.require_text("StationCode")?;
    let fallback = || {
        log::debug!("station {} misses a name length, reusing the code", code);
        code.clone()
    };
    Ok(Station {
        short_name: cursor.optional_text("KorteNaam").unwrap_or_else(fallback),
        medium_name: cursor.optional_text("MiddelNaam").unwrap_or_else(fallback),
        long_name: cursor.optional_text("LangeNaam").unwrap_or_else(fallback),
        uic: cursor.optional_text("UICCode"),
        kind: cursor.optional_text("Type"),
        code,
    })
}

fn decode_stations<'a, 'input>(nodes: impl Iterator<Item = Cursor<'a, 'input>>) -> Vec<Station>
where
    'input: 'a,
{
    nodes
        .filter_map(|node| match decode_station(node) {
            Ok(station) => Some(station),
            Err(why) => {
                log::debug!("dropping malformed station entry: {}", why);
                None
            }
        })
        .collect()
}

fn decode_platform(cursor: Cursor) -> Option<Platform> {
    let Some(number) = cursor.optional_text("SpoorNummer") else {
        log::debug!("platform entry without SpoorNummer");
        return None;
    };
    Some(Platform::new(
        number,
        cursor.child("SpoorFase").map(|fase| fase.text()),
    ))
}

fn decode_platforms(parent: Cursor, name: &'static str, status: &'static str) -> Vec<Platform> {
    parent
        .elements_with_status(name, status)
        .filter_map(decode_platform)
        .collect()
}

fn decode_short_route(train_node: Cursor, status: &'static str) -> Vec<Station> {
    match train_node.child_with_status("VerkorteRoute", status) {
        Some(route) => decode_stations(route.elements("Station")),
        None => Vec::new(),
    }
}

fn decode_modification(node: Cursor) -> Option<Modification> {
    let Some(text) = node.optional_text("WijzigingType") else {
        log::debug!("modification without WijzigingType");
        return None;
    };
    let Some(kind) = text.parse().ok().and_then(ModificationKind::from_code) else {
        log::debug!("unknown modification kind {:?}", text);
        return None;
    };
    Some(Modification {
        kind,
        cause_short: node.optional_text("WijzigingOorzaakKort"),
        cause_long: node.optional_text("WijzigingOorzaakLang"),
        station: node
            .child("WijzigingStation")
            .and_then(|station| decode_station(station).ok()),
    })
}

fn decode_modifications(parent: Cursor) -> Vec<Modification> {
    parent
        .elements("Wijziging")
        .filter_map(decode_modification)
        .collect()
}

fn decode_wing(node: Cursor) -> Result<Wing, DecodeError> {
    let planned_destination = decode_station(
        node.child_with_status("TreinVleugelEindBestemming", "Gepland")
            .ok_or(DecodeError::MissingElement("TreinVleugelEindBestemming"))?,
    )?;
    let current_destination = node
        .child_with_status("TreinVleugelEindBestemming", "Actueel")
        .and_then(|destination| decode_station(destination).ok())
        .unwrap_or_else(|| planned_destination.clone());

    Ok(Wing {
        planned_platform: decode_platforms(node, "TreinVleugelVertrekSpoor", "Gepland"),
        current_platform: decode_platforms(node, "TreinVleugelVertrekSpoor", "Actueel"),
        planned_stops: decode_stops(node, "Gepland"),
        current_stops: decode_stops(node, "Actueel"),
        composition: node
            .elements("MaterieelDeelDVS")
            .filter_map(decode_rolling_stock)
            .collect(),
        modifications: decode_modifications(node),
        planned_destination,
        current_destination,
    })
}

fn decode_stops(wing_node: Cursor, status: &'static str) -> Vec<Station> {
    match wing_node.child_with_status("StopStations", status) {
        Some(stops) => decode_stations(stops.elements("Station")),
        None => Vec::new(),
    }
}

fn decode_rolling_stock(node: Cursor) -> Option<RollingStockUnit> {
    let Some(kind) = node.optional_text("MaterieelSoort") else {
        log::debug!("rolling-stock entry without MaterieelSoort");
        return None;
    };
    Some(RollingStockUnit {
        kind,
        designation: node.optional_text("MaterieelAanduiding"),
        length: node.optional_text("MaterieelLengte"),
        planned_destination: node
            .child_with_status("MaterieelDeelEindBestemming", "Gepland")
            .and_then(|destination| decode_station(destination).ok()),
        current_destination: node
            .child_with_status("MaterieelDeelEindBestemming", "Actueel")
            .and_then(|destination| decode_station(destination).ok()),
        departure_position: node.optional_text("MaterieelDeelVertrekPositie"),
        departure_order: node.optional_text("MaterieelDeelVolgordeVertrek"),
    })
}

fn decode_travel_tips(train_node: Cursor) -> Vec<TravelTip> {
    train_node
        .elements("ReisTip")
        .filter_map(|tip| {
            let code = tip.optional_text("ReisTipCode")?;
            Some(TravelTip {
                code,
                stations: decode_stations(tip.elements("ReisTipStation")),
            })
        })
        .collect()
}

fn decode_boarding_tips(train_node: Cursor) -> Vec<BoardingTip> {
    train_node
        .elements("InstapTip")
        .filter_map(|tip| {
            Some(BoardingTip {
                transport_kind: tip.optional_text("InstapTipTreinSoort")?,
                alight_station: decode_station(tip.child("InstapTipUitstapStation")?).ok()?,
                destination: decode_station(tip.child("InstapTipTreinEindBestemming")?).ok()?,
                departure: parse_datetime(
                    "InstapTipVertrekTijd",
                    &tip.child("InstapTipVertrekTijd")?.text(),
                )
                .ok()?,
                platform: tip.child("InstapTipVertrekSpoor").and_then(decode_platform),
            })
        })
        .collect()
}

fn decode_transfer_tips(train_node: Cursor) -> Vec<TransferTip> {
    train_node
        .elements("OverstapTip")
        .filter_map(|tip| {
            Some(TransferTip {
                destination: decode_station(tip.child("OverstapTipBestemming")?).ok()?,
                transfer_station: decode_station(tip.child("OverstapTipOverstapStation")?).ok()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn station_xml(code: &str, name: &str) -> String {
        format!(
            "<StationCode>{code}</StationCode>\
             <KorteNaam>{name}</KorteNaam>\
             <MiddelNaam>{name}</MiddelNaam>\
             <LangeNaam>{name}</LangeNaam>\
             <UICCode>8400000</UICCode>\
             <Type>knooppuntIntercitystation</Type>"
        )
    }

    fn sample_message(ns: &str) -> String {
        let rtd = station_xml("RTD", "Rotterdam Centraal");
        let asd = station_xml("ASD", "Amsterdam Centraal");
        let gd = station_xml("GD", "Gouda");
        format!(
            r#"<PutReisInformatieBoodschapIn xmlns="{ns}">
  <ReisInformatieProductDVS TimeStamp="2014-04-12T10:00:00Z">
    <DynamischeVertrekStaat>
      <RitId>2650</RitId>
      <RitDatum>2014-04-12</RitDatum>
      <RitStation>{rtd}</RitStation>
      <Trein>
        <TreinNummer>2650</TreinNummer>
        <TreinSoort Code="IC">Intercity</TreinSoort>
        <Vervoerder>NS Int</Vervoerder>
        <TreinStatus>0</TreinStatus>
        <VertrekTijd InfoStatus="Gepland">2014-04-12T10:05:00Z</VertrekTijd>
        <VertrekTijd InfoStatus="Actueel">2014-04-12T10:07:00Z</VertrekTijd>
        <ExacteVertrekVertraging>PT2M</ExacteVertrekVertraging>
        <GedempteVertrekVertraging>PT2M</GedempteVertrekVertraging>
        <TreinVertrekSpoor InfoStatus="Gepland">
          <SpoorNummer>4</SpoorNummer>
        </TreinVertrekSpoor>
        <TreinVertrekSpoor InfoStatus="Actueel">
          <SpoorNummer>4</SpoorNummer>
          <SpoorFase>a</SpoorFase>
        </TreinVertrekSpoor>
        <TreinEindBestemming InfoStatus="Gepland">{asd}</TreinEindBestemming>
        <TreinEindBestemming InfoStatus="Actueel">{asd}</TreinEindBestemming>
        <Reserveren>N</Reserveren>
        <Toeslag>N</Toeslag>
        <NietInstappen>N</NietInstappen>
        <RangeerBeweging>N</RangeerBeweging>
        <SpeciaalKaartje>N</SpeciaalKaartje>
        <AchterBlijvenAchtersteTreinDeel>J</AchterBlijvenAchtersteTreinDeel>
        <VerkorteRoute InfoStatus="Gepland">
          <Station>{gd}</Station>
        </VerkorteRoute>
        <VerkorteRoute InfoStatus="Actueel">
          <Station>{gd}</Station>
        </VerkorteRoute>
        <TreinVleugel>
          <TreinVleugelVertrekSpoor InfoStatus="Gepland">
            <SpoorNummer>4</SpoorNummer>
          </TreinVleugelVertrekSpoor>
          <TreinVleugelEindBestemming InfoStatus="Gepland">{asd}</TreinVleugelEindBestemming>
          <StopStations InfoStatus="Gepland">
            <Station>{gd}</Station>
            <Station>{asd}</Station>
          </StopStations>
          <MaterieelDeelDVS>
            <MaterieelSoort>VIRM</MaterieelSoort>
            <MaterieelAanduiding>6</MaterieelAanduiding>
            <MaterieelLengte>162</MaterieelLengte>
            <MaterieelDeelEindBestemming InfoStatus="Gepland">{asd}</MaterieelDeelEindBestemming>
          </MaterieelDeelDVS>
        </TreinVleugel>
        <Wijziging>
          <WijzigingType>10</WijzigingType>
          <WijzigingOorzaakLang>herstelwerkzaamheden</WijzigingOorzaakLang>
        </Wijziging>
      </Trein>
    </DynamischeVertrekStaat>
  </ReisInformatieProductDVS>
</PutReisInformatieBoodschapIn>"#
        )
    }

    #[test]
    fn decodes_legacy_namespace() {
        let train = decode_train(&sample_message(NS_LEGACY)).unwrap();

        assert_eq!(train.trip_id, "2650");
        assert_eq!(train.train_number, "2650");
        assert_eq!(train.trip_station.code, "RTD");
        assert_eq!(train.transport_kind.code, "IC");
        assert_eq!(train.transport_kind.name, "Intercity");
        assert_eq!(train.carrier, "NS International");
        assert_eq!(train.status, "0");
        assert_eq!(
            train.message_timestamp,
            Utc.with_ymd_and_hms(2014, 4, 12, 10, 0, 0).unwrap()
        );
        assert_eq!(
            train.current_departure,
            Utc.with_ymd_and_hms(2014, 4, 12, 10, 7, 0).unwrap()
        );
        assert_eq!(train.exact_delay_seconds, 120);
        assert_eq!(train.planned_platform, vec![Platform::parse("4")]);
        assert_eq!(train.current_platform, vec![Platform::parse("4a")]);
        assert_eq!(train.current_destinations[0].code, "ASD");
        assert_eq!(train.planned_short_route[0].code, "GD");
        assert!(train.rear_stays_behind);
        assert!(!train.do_not_board);
        assert!(!train.synthetic);
        assert_eq!(train.departed_timestamp, None);
    }

    #[test]
    fn decodes_current_namespace() {
        let train = decode_train(&sample_message(NS_CURRENT)).unwrap();
        assert_eq!(train.trip_id, "2650");
    }

    #[test]
    fn decodes_wing_details() {
        let train = decode_train(&sample_message(NS_LEGACY)).unwrap();

        assert_eq!(train.wings.len(), 1);
        let wing = &train.wings[0];
        assert_eq!(wing.planned_destination.code, "ASD");
        // no Actueel destination in the message: falls back to the plan
        assert_eq!(wing.current_destination.code, "ASD");
        assert_eq!(wing.planned_stops.len(), 2);
        assert_eq!(wing.composition.len(), 1);
        assert_eq!(wing.composition[0].unit_type(), "VIRM-6");
        assert_eq!(wing.composition[0].length.as_deref(), Some("162"));
    }

    #[test]
    fn decodes_modifications() {
        let train = decode_train(&sample_message(NS_LEGACY)).unwrap();
        assert_eq!(train.modifications.len(), 1);
        assert_eq!(train.modifications[0].kind, ModificationKind::Delayed);
        assert_eq!(
            train.modifications[0].cause_long.as_deref(),
            Some("herstelwerkzaamheden")
        );
        assert!(!train.is_cancelled());
    }

    #[test]
    fn rejects_non_xml() {
        assert!(matches!(
            decode_train("this is not xml"),
            Err(DecodeError::Xml(_))
        ));
    }

    #[test]
    fn rejects_unknown_namespace() {
        let message = sample_message("urn:example:something:else");
        assert!(matches!(
            decode_train(&message),
            Err(DecodeError::MissingElement("ReisInformatieProductDVS"))
        ));
    }

    #[test]
    fn rejects_missing_train_node() {
        let message = format!(
            r#"<ReisInformatieProductDVS xmlns="{NS_LEGACY}" TimeStamp="2014-04-12T10:00:00Z">
  <DynamischeVertrekStaat>
    <RitId>2650</RitId>
    <RitDatum>2014-04-12</RitDatum>
  </DynamischeVertrekStaat>
</ReisInformatieProductDVS>"#
        );
        assert!(matches!(
            decode_train(&message),
            Err(DecodeError::MissingElement("Trein"))
        ));
    }

    #[test]
    fn negative_delay_is_preserved() {
        let message = sample_message(NS_LEGACY).replace(
            "<ExacteVertrekVertraging>PT2M</ExacteVertrekVertraging>",
            "<ExacteVertrekVertraging>-PT1M</ExacteVertrekVertraging>",
        );
        let train = decode_train(&message).unwrap();
        assert_eq!(train.exact_delay_seconds, -60);
    }

    #[test]
    fn missing_optional_fields_do_not_fail() {
        let message = sample_message(NS_LEGACY)
            .replace("<Reserveren>N</Reserveren>", "")
            .replace("<ExacteVertrekVertraging>PT2M</ExacteVertrekVertraging>", "");
        let train = decode_train(&message).unwrap();
        assert!(!train.reservation_required);
        assert_eq!(train.exact_delay_seconds, 0);
    }

    #[test]
    fn carrier_normalization_table() {
        assert_eq!(normalize_carrier("NS Interna"), "NS International");
        assert_eq!(normalize_carrier("Locon Bene"), "Locon Benelux");
        assert_eq!(normalize_carrier("Arriva"), "Arriva");
    }
}
