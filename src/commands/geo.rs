//! Geospatial commands: GEOADD, GEOPOS, GEODIST, GEOSEARCH
//!
//! Geo keys are ordinary sorted sets whose member scores are 52-bit
//! interleaved geohashes; everything here goes through the sorted-set
//! storage plus the encode/decode helpers in `store::geo`.

use crate::commands::{Request, err_not_float, err_wrong_args, err_wrongtype, parse_f64};
use crate::protocol::Frame;
use crate::store::Store;
use crate::store::geo::{
    decode, encode, haversine_m, unit_to_meters, valid_latitude, valid_longitude,
};

/// `GEOADD key lon lat member [lon lat member ...]`
pub fn geoadd(req: &Request, store: &mut Store) -> Frame {
    if req.arity() < 4 || (req.arity() - 1) % 3 != 0 {
        return err_wrong_args("geoadd");
    }
    let mut additions = Vec::new();
    for i in (1..req.arity()).step_by(3) {
        let (Some(lon), Some(lat)) = (parse_f64(req.arg(i)), parse_f64(req.arg(i + 1))) else {
            return err_not_float();
        };
        if !valid_longitude(lon) {
            return Frame::error("ERR invalid longitude value");
        }
        if !valid_latitude(lat) {
            return Frame::error("ERR invalid latitude value");
        }
        additions.push((encode(lon, lat) as f64, req.arg(i + 2).to_vec()));
    }
    let zset = match store.zset_entry(req.arg(0)) {
        Ok(zset) => zset,
        Err(_) => return err_wrongtype(),
    };
    let mut added = 0;
    for (score, member) in additions {
        if zset.insert(member, score) {
            added += 1;
        }
    }
    Frame::Integer(added)
}

/// `GEOPOS key member [member ...]` — `[lon, lat]` per member, null for
/// missing members.
pub fn geopos(req: &Request, store: &mut Store) -> Frame {
    if req.arity() < 2 {
        return err_wrong_args("geopos");
    }
    let zset = match store.zset(req.arg(0)) {
        Ok(Some(zset)) => Some(zset),
        Ok(None) => None,
        Err(_) => return err_wrongtype(),
    };
    let mut items = Vec::new();
    for i in 1..req.arity() {
        let position = zset.as_ref().and_then(|z| z.score(req.arg(i)));
        match position {
            Some(score) => {
                let (lon, lat) = decode(score as u64);
                items.push(Frame::Array(vec![
                    Frame::bulk(format!("{}", lon)),
                    Frame::bulk(format!("{}", lat)),
                ]));
            }
            None => items.push(Frame::NullArray),
        }
    }
    Frame::Array(items)
}

/// `GEODIST key member1 member2 [unit]`
pub fn geodist(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 3 && req.arity() != 4 {
        return err_wrong_args("geodist");
    }
    let to_meters = if req.arity() == 4 {
        match unit_to_meters(&req.arg_str(3)) {
            Some(factor) => factor,
            None => return Frame::error("ERR unsupported unit provided. please use m, km, ft, mi"),
        }
    } else {
        1.0
    };
    let zset = match store.zset(req.arg(0)) {
        Ok(Some(zset)) => zset,
        Ok(None) => return Frame::NullBulk,
        Err(_) => return err_wrongtype(),
    };
    let (Some(a), Some(b)) = (zset.score(req.arg(1)), zset.score(req.arg(2))) else {
        return Frame::NullBulk;
    };
    let (lon1, lat1) = decode(a as u64);
    let (lon2, lat2) = decode(b as u64);
    let distance = haversine_m(lon1, lat1, lon2, lat2) / to_meters;
    Frame::bulk(format!("{:.4}", distance))
}

/// `GEOSEARCH key FROMLONLAT lon lat BYRADIUS radius unit` — members
/// within the radius, sorted lexicographically.
pub fn geosearch(req: &Request, store: &mut Store) -> Frame {
    if req.arity() != 7 {
        return err_wrong_args("geosearch");
    }
    if !req.arg(1).eq_ignore_ascii_case(b"FROMLONLAT")
        || !req.arg(4).eq_ignore_ascii_case(b"BYRADIUS")
    {
        return Frame::error("ERR syntax error");
    }
    let (Some(lon), Some(lat), Some(radius)) = (
        parse_f64(req.arg(2)),
        parse_f64(req.arg(3)),
        parse_f64(req.arg(5)),
    ) else {
        return err_not_float();
    };
    if !valid_longitude(lon) {
        return Frame::error("ERR invalid longitude value");
    }
    if !valid_latitude(lat) {
        return Frame::error("ERR invalid latitude value");
    }
    let Some(to_meters) = unit_to_meters(&req.arg_str(6)) else {
        return Frame::error("ERR unsupported unit provided. please use m, km, ft, mi");
    };
    let radius_m = radius * to_meters;

    let zset = match store.zset(req.arg(0)) {
        Ok(Some(zset)) => zset,
        Ok(None) => return Frame::Array(vec![]),
        Err(_) => return err_wrongtype(),
    };
    // Linear scan: decode every member and keep those inside the circle.
    let mut hits: Vec<Vec<u8>> = zset
        .iter()
        .filter(|(_, score)| {
            let (mlon, mlat) = decode(*score as u64);
            haversine_m(lon, lat, mlon, mlat) <= radius_m
        })
        .map(|(member, _)| member.to_vec())
        .collect();
    hits.sort();
    Frame::Array(hits.into_iter().map(Frame::Bulk).collect())
}
