//! Read side: search and grouped statistics over stored record chunks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::info;

use crate::error::QueryError;
use crate::records::{BillStatus, FlightRecord, LinkageStatus, Record};
use crate::store::DocumentStore;

/// Every stored record of `doc_id`, chunk by chunk.
async fn load_records(store: &dyn DocumentStore, doc_id: &str) -> Result<Vec<Record>, QueryError> {
    let chunks = store.chunks(doc_id).await?;
    if chunks.is_empty() {
        return Err(QueryError::NotFound(doc_id.to_string()));
    }
    Ok(chunks.into_iter().flat_map(|c| c.records).collect())
}

fn rupees(amount: f64) -> String {
    format!("₹{:.2}", amount)
}

// =============================================================================
// SEARCH
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub query: String,
    pub page: usize,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: 0,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "Reg_No")]
    pub reg_no: String,
    #[serde(rename = "Arr_Date")]
    pub arr_date: String,
    #[serde(rename = "Airport_Name")]
    pub airport_name: String,
    #[serde(rename = "Operator_Name")]
    pub operator_name: String,
    #[serde(rename = "Aircraft_Type")]
    pub aircraft_type: String,
    #[serde(rename = "Count")]
    pub count: u32,
    #[serde(rename = "Unique_Id")]
    pub unique_id: String,
    #[serde(rename = "Airtime_Hours")]
    pub airtime_hours: String,
    #[serde(rename = "Linkage_Status")]
    pub linkage_status: LinkageStatus,
    #[serde(rename = "Arr_Bill_Status")]
    pub arr_bill_status: BillStatus,
    #[serde(rename = "Dep_Bill_Status")]
    pub dep_bill_status: BillStatus,
    #[serde(rename = "UDF_Bill_Status")]
    pub udf_bill_status: BillStatus,
    #[serde(rename = "Landing")]
    pub landing: String,
    #[serde(rename = "UDF_Charge")]
    pub udf_charge: String,
}

impl SearchHit {
    fn from_flight(record: &FlightRecord, arr_date: String) -> Self {
        Self {
            reg_no: record.reg_no.clone(),
            arr_date,
            airport_name: record.airport_name.clone(),
            operator_name: record.operator_name.clone(),
            aircraft_type: record.aircraft_type.clone(),
            count: 1,
            unique_id: record.unique_id.clone(),
            airtime_hours: format!("{:.2}", record.airtime_hours),
            linkage_status: record.linkage_status,
            arr_bill_status: record.arr_bill_status,
            dep_bill_status: record.dep_bill_status,
            udf_bill_status: record.udf_bill_status,
            landing: rupees(record.charges.landing),
            udf_charge: rupees(record.charges.udf_charge),
        }
    }
}

fn matches(record: &FlightRecord, arr_date: &str, needle: &str) -> bool {
    needle.is_empty()
        || [
            record.reg_no.as_str(),
            arr_date,
            record.airport_name.as_str(),
            record.operator_name.as_str(),
            record.aircraft_type.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Case-insensitive substring search over flight records, paginated after
/// filtering. Base records never match.
pub async fn search(
    store: &dyn DocumentStore,
    doc_id: &str,
    query: &SearchQuery,
) -> Result<Vec<SearchHit>, QueryError> {
    let records = load_records(store, doc_id).await?;
    let needle = query.query.trim().to_lowercase();

    let hits: Vec<SearchHit> = records
        .iter()
        .filter_map(Record::as_flight)
        .filter_map(|record| {
            let arr_date = record.arrival_date();
            matches(record, &arr_date, &needle).then(|| SearchHit::from_flight(record, arr_date))
        })
        .skip(query.page.saturating_mul(query.limit))
        .take(query.limit)
        .collect();

    info!(doc_id, query = %needle, page = query.page, results = hits.len(), "search");
    Ok(hits)
}

// =============================================================================
// GROUPED STATISTICS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    Operator,
    Airport,
}

impl FromStr for GroupBy {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "operator" => Ok(GroupBy::Operator),
            "airport" => Ok(GroupBy::Airport),
            other => Err(QueryError::InvalidGroupBy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorStats {
    #[serde(rename = "Operator_Name")]
    pub operator_name: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Flight_Count")]
    pub flight_count: usize,
    #[serde(rename = "Avg_Airtime_Hours")]
    pub avg_airtime_hours: f64,
    #[serde(rename = "Total_Hours")]
    pub total_hours: f64,
    #[serde(rename = "Same_Linkage_Count")]
    pub same_linkage_count: usize,
    #[serde(rename = "Different_Linkage_Count")]
    pub different_linkage_count: usize,
    #[serde(rename = "Arr_Billed_Count")]
    pub arr_billed_count: usize,
    #[serde(rename = "Arr_UnBilled_Count")]
    pub arr_unbilled_count: usize,
    #[serde(rename = "Dep_Billed_Count")]
    pub dep_billed_count: usize,
    #[serde(rename = "Dep_UnBilled_Count")]
    pub dep_unbilled_count: usize,
    #[serde(rename = "UDF_Billed_Count")]
    pub udf_billed_count: usize,
    #[serde(rename = "UDF_UnBilled_Count")]
    pub udf_unbilled_count: usize,
    #[serde(rename = "Total_Landing_Charges")]
    pub total_landing_charges: f64,
    #[serde(rename = "Total_UDF_Charges")]
    pub total_udf_charges: f64,
}

impl OperatorStats {
    fn new(first: &FlightRecord) -> Self {
        Self {
            operator_name: first.operator_name.clone(),
            region: first.dep_location.clone(),
            flight_count: 0,
            avg_airtime_hours: 0.0,
            total_hours: 0.0,
            same_linkage_count: 0,
            different_linkage_count: 0,
            arr_billed_count: 0,
            arr_unbilled_count: 0,
            dep_billed_count: 0,
            dep_unbilled_count: 0,
            udf_billed_count: 0,
            udf_unbilled_count: 0,
            total_landing_charges: 0.0,
            total_udf_charges: 0.0,
        }
    }

    fn add(&mut self, record: &FlightRecord) {
        fn tally(status: BillStatus, billed: &mut usize, unbilled: &mut usize) {
            match status {
                BillStatus::Billed => *billed += 1,
                BillStatus::Unbilled => *unbilled += 1,
            }
        }

        self.flight_count += 1;
        self.total_hours += record.airtime_hours;
        match record.linkage_status {
            LinkageStatus::Same => self.same_linkage_count += 1,
            LinkageStatus::Different => self.different_linkage_count += 1,
            LinkageStatus::Unknown => {}
        }
        tally(record.arr_bill_status, &mut self.arr_billed_count, &mut self.arr_unbilled_count);
        tally(record.dep_bill_status, &mut self.dep_billed_count, &mut self.dep_unbilled_count);
        tally(record.udf_bill_status, &mut self.udf_billed_count, &mut self.udf_unbilled_count);
        self.total_landing_charges += record.charges.landing;
        self.total_udf_charges += record.charges.udf_charge;
    }

    fn finish(mut self) -> Self {
        if self.flight_count > 0 {
            self.avg_airtime_hours = self.total_hours / self.flight_count as f64;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportStats {
    #[serde(rename = "Airport_Name")]
    pub airport_name: String,
    #[serde(rename = "Flight_Count")]
    pub flight_count: usize,
    #[serde(rename = "Total_Landing_Charges")]
    pub total_landing_charges: f64,
    #[serde(rename = "Total_UDF_Charges")]
    pub total_udf_charges: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GroupStats {
    Operator(OperatorStats),
    Airport(AirportStats),
}

/// Fold values into groups keyed by `key`, keeping first-seen group order.
fn fold_groups<'a, G>(
    flights: impl Iterator<Item = &'a FlightRecord>,
    key: impl Fn(&FlightRecord) -> &str,
    new: impl Fn(&FlightRecord) -> G,
    mut add: impl FnMut(&mut G, &FlightRecord),
) -> Vec<G> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<G> = Vec::new();
    for record in flights {
        let slot = *positions.entry(key(record).to_string()).or_insert_with(|| {
            groups.push(new(record));
            groups.len() - 1
        });
        add(&mut groups[slot], record);
    }
    groups
}

/// Per-operator or per-airport aggregates over the departure records of a
/// stored document.
pub async fn group_stats(
    store: &dyn DocumentStore,
    doc_id: &str,
    group_by: GroupBy,
) -> Result<Vec<GroupStats>, QueryError> {
    let records = load_records(store, doc_id).await?;
    let flights = records.iter().filter_map(Record::as_flight);

    let groups: Vec<GroupStats> = match group_by {
        GroupBy::Operator => fold_groups(
            flights,
            |r| r.operator_name.as_str(),
            OperatorStats::new,
            |group, record| group.add(record),
        )
        .into_iter()
        .map(|g| GroupStats::Operator(g.finish()))
        .collect(),
        GroupBy::Airport => fold_groups(
            flights,
            |r| r.airport_name.as_str(),
            |r| AirportStats {
                airport_name: r.airport_name.clone(),
                flight_count: 0,
                total_landing_charges: 0.0,
                total_udf_charges: 0.0,
            },
            |group, record| {
                group.flight_count += 1;
                group.total_landing_charges += record.charges.landing;
                group.total_udf_charges += record.charges.udf_charge;
            },
        )
        .into_iter()
        .map(GroupStats::Airport)
        .collect(),
    };

    info!(doc_id, ?group_by, groups = groups.len(), "group stats");
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel_time::to_local;
    use crate::records::{AirtimeColor, BaseRecord, Charges};
    use crate::store::{DataChunk, MemoryDocumentStore};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    struct Row {
        reg: &'static str,
        operator: &'static str,
        airport: &'static str,
        hours: f64,
        linkage: LinkageStatus,
        landing: f64,
    }

    fn flight(seq: usize, row: &Row) -> Record {
        let arr = Utc.with_ymd_and_hms(2023, 3, 15, 20, 0, 0).unwrap();
        Record::Flight(FlightRecord {
            unique_id: format!("FLIGHT_{}_20261019103000", seq),
            arrival_gmt: Some(arr),
            departure_gmt: None,
            dep_location: format!("LOC{}", seq),
            dest_location: String::new(),
            airport_name: row.airport.into(),
            operator_name: row.operator.into(),
            aircraft_type: "A320".into(),
            reg_no: row.reg.into(),
            airtime_hours: row.hours,
            airtime_color: AirtimeColor::from_hours(row.hours),
            dep_local: None,
            arr_local: Some(to_local(arr)),
            linkage_status: row.linkage,
            charges: Charges {
                landing: row.landing,
                udf_charge: 10.0,
                ..Charges::default()
            },
            arr_bill_status: BillStatus::determine(row.landing, &crate::raw::Cell::Empty),
            dep_bill_status: BillStatus::Unbilled,
            udf_bill_status: BillStatus::Billed,
        })
    }

    async fn seeded() -> MemoryDocumentStore {
        let rows = [
            Row { reg: "VT-ABC", operator: "Air A", airport: "Delhi", hours: 12.0, linkage: LinkageStatus::Same, landing: 100.0 },
            Row { reg: "VT-XYZ", operator: "Air B", airport: "Mumbai", hours: 0.0, linkage: LinkageStatus::Unknown, landing: 0.0 },
            Row { reg: "VT-ABD", operator: "Air A", airport: "Delhi", hours: 6.0, linkage: LinkageStatus::Different, landing: 50.5 },
        ];
        let records: Vec<Record> = rows.iter().enumerate().map(|(i, r)| flight(i, r)).collect();
        let store = MemoryDocumentStore::new();
        // Split across two chunks to exercise reassembly.
        store
            .put_chunk("doc", &DataChunk { index: 1, records: records[2..].to_vec() })
            .await
            .unwrap();
        store
            .put_chunk("doc", &DataChunk { index: 0, records: records[..2].to_vec() })
            .await
            .unwrap();
        store
    }

    fn query(q: &str, page: usize, limit: usize) -> SearchQuery {
        SearchQuery {
            query: q.into(),
            page,
            limit,
        }
    }

    // -------------------------------------------------------------------------
    // SEARCH
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_empty_query_returns_all_in_order() {
        let store = seeded().await;
        let hits = search(&store, "doc", &SearchQuery::default()).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.unique_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["FLIGHT_0_20261019103000", "FLIGHT_1_20261019103000", "FLIGHT_2_20261019103000"]
        );
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let store = seeded().await;
        let hits = search(&store, "doc", &query("vt-ab", 0, 100)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].reg_no, "VT-ABC");

        let hits = search(&store, "doc", &query("MUMBAI", 0, 100)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].operator_name, "Air B");
    }

    #[tokio::test]
    async fn test_search_matches_local_arrival_date() {
        let store = seeded().await;
        // 20:00 UTC is already the next day in IST.
        let hits = search(&store, "doc", &query("2023-03-16", 0, 100)).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].arr_date, "2023-03-16");
    }

    #[tokio::test]
    async fn test_search_hit_formatting() {
        let store = seeded().await;
        let hits = search(&store, "doc", &query("vt-abd", 0, 100)).await.unwrap();
        let value = serde_json::to_value(&hits[0]).unwrap();
        assert_eq!(value["Landing"], "₹50.50");
        assert_eq!(value["UDF_Charge"], "₹10.00");
        assert_eq!(value["Airtime_Hours"], "6.00");
        assert_eq!(value["Count"], 1);
        assert_eq!(value["Arr_Bill_Status"], "billed");
    }

    #[tokio::test]
    async fn test_search_paginates_after_filtering() {
        let store = seeded().await;
        let hits = search(&store, "doc", &query("air a", 1, 1)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].reg_no, "VT-ABD");
        assert!(search(&store, "doc", &query("", 5, 100)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_doc_is_not_found() {
        let store = seeded().await;
        let err = search(&store, "missing", &SearchQuery::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "No data found for doc_id missing");
    }

    #[tokio::test]
    async fn test_base_records_are_not_searched() {
        let store = MemoryDocumentStore::new();
        let base = Record::Base(BaseRecord {
            customer_name: "Acme".into(),
            payer_id: String::new(),
            van_spoc: String::new(),
            cf_validity: String::new(),
            fleet_count: 0.0,
            opening_balance: 0.0,
            assessment: 0.0,
            realisation: 0.0,
            closing_balance: 0.0,
            sd_bg: 0.0,
            avg_monthly_assessment: 0.0,
            reg_no: Some("VT-ABC".into()),
            extra: BTreeMap::new(),
        });
        store
            .put_chunk("base", &DataChunk { index: 0, records: vec![base] })
            .await
            .unwrap();
        assert!(search(&store, "base", &SearchQuery::default()).await.unwrap().is_empty());
        assert!(group_stats(&store, "base", GroupBy::Operator).await.unwrap().is_empty());
    }

    // -------------------------------------------------------------------------
    // GROUP STATS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_operator_groups() {
        let store = seeded().await;
        let groups = group_stats(&store, "doc", GroupBy::Operator).await.unwrap();
        assert_eq!(groups.len(), 2);

        let GroupStats::Operator(air_a) = &groups[0] else {
            panic!("expected operator stats");
        };
        assert_eq!(air_a.operator_name, "Air A");
        assert_eq!(air_a.region, "LOC0");
        assert_eq!(air_a.flight_count, 2);
        assert_eq!(air_a.total_hours, 18.0);
        assert_eq!(air_a.avg_airtime_hours, 9.0);
        assert_eq!(air_a.same_linkage_count, 1);
        assert_eq!(air_a.different_linkage_count, 1);
        assert_eq!(air_a.arr_billed_count, 2);
        assert_eq!(air_a.udf_billed_count, 2);
        assert_eq!(air_a.dep_unbilled_count, 2);
        assert_eq!(air_a.total_landing_charges, 150.5);

        let value = serde_json::to_value(&groups[1]).unwrap();
        assert_eq!(value["Operator_Name"], "Air B");
        assert_eq!(value["Arr_UnBilled_Count"], 1);
        assert_eq!(value["Avg_Airtime_Hours"], 0.0);
    }

    #[tokio::test]
    async fn test_airport_groups() {
        let store = seeded().await;
        let groups = group_stats(&store, "doc", GroupBy::Airport).await.unwrap();
        let value = serde_json::to_value(&groups).unwrap();
        assert_eq!(value[0]["Airport_Name"], "Delhi");
        assert_eq!(value[0]["Flight_Count"], 2);
        assert_eq!(value[0]["Total_UDF_Charges"], 20.0);
        assert_eq!(value[1]["Airport_Name"], "Mumbai");
        assert!(value[0].get("Region").is_none());
    }

    #[test]
    fn test_group_by_parsing() {
        assert_eq!("Operator".parse::<GroupBy>().unwrap(), GroupBy::Operator);
        assert_eq!("airport".parse::<GroupBy>().unwrap(), GroupBy::Airport);
        assert!(matches!("region".parse::<GroupBy>(), Err(QueryError::InvalidGroupBy(_))));
    }
}
