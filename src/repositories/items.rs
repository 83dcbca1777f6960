//! Conversion between domain records and DynamoDB attribute maps.

use crate::{
    editor::EditState,
    ledger::{CommentLog, VoteLedger},
    models::{Comment, Meme, ReportDetails, Role, User},
};
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, str::FromStr};
use uuid::Uuid;

pub type Item = HashMap<String, AttributeValue>;

pub fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

pub fn n(value: impl ToString) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub fn time(value: DateTime<Utc>) -> AttributeValue {
    AttributeValue::S(value.to_rfc3339())
}

fn get_s<'a>(item: &'a Item, key: &str) -> Option<&'a str> {
    item.get(key)?.as_s().ok().map(String::as_str)
}

fn get_parsed<T: FromStr>(item: &Item, key: &str) -> Option<T> {
    get_s(item, key)?.parse().ok()
}

fn get_n<T: FromStr>(item: &Item, key: &str) -> Option<T> {
    item.get(key)?.as_n().ok()?.parse().ok()
}

fn get_bool(item: &Item, key: &str) -> Option<bool> {
    item.get(key)?.as_bool().ok().copied()
}

fn get_time(item: &Item, key: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(get_s(item, key)?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Missing sets are empty; DynamoDB cannot store an empty string set.
fn get_id_set(item: &Item, key: &str) -> Option<Vec<Uuid>> {
    match item.get(key) {
        None => Some(Vec::new()),
        Some(value) => value
            .as_ss()
            .ok()?
            .iter()
            .map(|raw| Uuid::parse_str(raw).ok())
            .collect(),
    }
}

/// Design attributes as stored. Shared by PutItem and the content update.
pub fn design_attributes(design: &EditState) -> Vec<(&'static str, AttributeValue)> {
    vec![
        ("title", s(&design.title)),
        ("top_text", s(&design.top_text)),
        ("bottom_text", s(&design.bottom_text)),
        ("top_text_size", n(design.top_text_size)),
        ("bottom_text_size", n(design.bottom_text_size)),
        ("top_text_color", s(design.top_text_color.to_string())),
        ("bottom_text_color", s(design.bottom_text_color.to_string())),
        ("top_text_stroke", s(design.top_text_stroke.to_string())),
        ("bottom_text_stroke", s(design.bottom_text_stroke.to_string())),
        ("top_text_position", n(design.top_text_position)),
        ("bottom_text_position", n(design.bottom_text_position)),
        ("top_text_effect", s(design.top_text_effect.to_string())),
        ("bottom_text_effect", s(design.bottom_text_effect.to_string())),
        ("image_filter", s(design.image_filter.to_string())),
    ]
}

fn item_to_design(item: &Item) -> Option<EditState> {
    Some(EditState {
        title: get_s(item, "title")?.to_string(),
        top_text: get_s(item, "top_text")?.to_string(),
        bottom_text: get_s(item, "bottom_text")?.to_string(),
        top_text_size: get_n(item, "top_text_size")?,
        bottom_text_size: get_n(item, "bottom_text_size")?,
        top_text_color: get_parsed(item, "top_text_color")?,
        bottom_text_color: get_parsed(item, "bottom_text_color")?,
        top_text_stroke: get_parsed(item, "top_text_stroke")?,
        bottom_text_stroke: get_parsed(item, "bottom_text_stroke")?,
        top_text_position: get_n(item, "top_text_position")?,
        bottom_text_position: get_n(item, "bottom_text_position")?,
        top_text_effect: get_parsed(item, "top_text_effect")?,
        bottom_text_effect: get_parsed(item, "bottom_text_effect")?,
        image_filter: get_parsed(item, "image_filter")?,
    })
}

pub fn comment_to_attribute(comment: &Comment) -> AttributeValue {
    AttributeValue::M(HashMap::from([
        ("comment_id".to_string(), s(comment.comment_id.to_string())),
        ("user_id".to_string(), s(comment.user_id.to_string())),
        ("text".to_string(), s(&comment.text)),
        ("created_at".to_string(), time(comment.created_at)),
    ]))
}

fn attribute_to_comment(value: &AttributeValue) -> Option<Comment> {
    let map = value.as_m().ok()?;
    Some(Comment {
        comment_id: get_parsed(map, "comment_id")?,
        user_id: get_parsed(map, "user_id")?,
        text: get_s(map, "text")?.to_string(),
        created_at: get_time(map, "created_at")?,
    })
}

pub fn report_to_attribute(report: &ReportDetails) -> AttributeValue {
    AttributeValue::M(HashMap::from([
        ("reason".to_string(), s(&report.reason)),
        ("reported_by".to_string(), s(report.reported_by.to_string())),
        ("reported_at".to_string(), time(report.reported_at)),
    ]))
}

fn attribute_to_report(value: &AttributeValue) -> Option<ReportDetails> {
    let map = value.as_m().ok()?;
    Some(ReportDetails {
        reason: get_s(map, "reason")?.to_string(),
        reported_by: get_parsed(map, "reported_by")?,
        reported_at: get_time(map, "reported_at")?,
    })
}

fn id_set(ids: &std::collections::BTreeSet<Uuid>) -> Option<AttributeValue> {
    (!ids.is_empty()).then(|| AttributeValue::Ss(ids.iter().map(Uuid::to_string).collect()))
}

pub fn meme_to_item(meme: &Meme) -> Item {
    let mut item: Item = design_attributes(&meme.design)
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    item.insert("meme_id".into(), s(meme.meme_id.to_string()));
    item.insert("is_draft".into(), AttributeValue::Bool(meme.is_draft));
    item.insert("views".into(), n(meme.views));
    item.insert("is_reported".into(), AttributeValue::Bool(meme.is_reported));
    item.insert(
        "comments".into(),
        AttributeValue::L(meme.comments.as_slice().iter().map(comment_to_attribute).collect()),
    );
    item.insert("created_at".into(), time(meme.created_at));
    item.insert("updated_at".into(), time(meme.updated_at));
    if let Some(url) = &meme.image_url {
        item.insert("image_url".into(), s(url));
    }
    if let Some(key) = &meme.image_key {
        item.insert("image_key".into(), s(key));
    }
    if let Some(creator) = meme.creator_id {
        item.insert("creator_id".into(), s(creator.to_string()));
    }
    if let Some(up) = id_set(meme.votes.upvotes()) {
        item.insert("upvotes".into(), up);
    }
    if let Some(down) = id_set(meme.votes.downvotes()) {
        item.insert("downvotes".into(), down);
    }
    if let Some(report) = &meme.report {
        item.insert("report".into(), report_to_attribute(report));
    }
    item
}

pub fn item_to_meme(item: &Item) -> Option<Meme> {
    let comments = match item.get("comments") {
        None => Vec::new(),
        Some(list) => list
            .as_l()
            .ok()?
            .iter()
            .map(attribute_to_comment)
            .collect::<Option<Vec<_>>>()?,
    };
    let report = match item.get("report") {
        None => None,
        Some(value) => Some(attribute_to_report(value)?),
    };
    let creator_id = match get_s(item, "creator_id") {
        None => None,
        Some(raw) => Some(Uuid::parse_str(raw).ok()?),
    };

    Some(Meme {
        meme_id: get_parsed(item, "meme_id")?,
        design: item_to_design(item)?,
        image_url: get_s(item, "image_url").map(str::to_string),
        image_key: get_s(item, "image_key").map(str::to_string),
        is_draft: get_bool(item, "is_draft").unwrap_or(false),
        creator_id,
        votes: VoteLedger::from_sets(get_id_set(item, "upvotes")?, get_id_set(item, "downvotes")?),
        comments: CommentLog::new(comments),
        views: get_n(item, "views").unwrap_or(0),
        is_reported: get_bool(item, "is_reported").unwrap_or(false),
        report,
        created_at: get_time(item, "created_at")?,
        updated_at: get_time(item, "updated_at")?,
    })
}

pub fn user_to_item(user: &User) -> Item {
    let mut item = Item::from([
        ("user_id".to_string(), s(user.user_id.to_string())),
        ("username".to_string(), s(&user.username)),
        ("email".to_string(), s(&user.email)),
        ("password_hash".to_string(), s(&user.password_hash)),
        ("role".to_string(), s(user.role.as_str())),
        ("created_at".to_string(), time(user.created_at)),
        ("updated_at".to_string(), time(user.updated_at)),
    ]);
    if let Some(avatar) = &user.avatar {
        item.insert("avatar".into(), s(avatar));
    }
    item
}

pub fn item_to_user(item: &Item) -> Option<User> {
    Some(User {
        user_id: get_parsed(item, "user_id")?,
        username: get_s(item, "username")?.to_string(),
        email: get_s(item, "email")?.to_string(),
        password_hash: get_s(item, "password_hash")?.to_string(),
        avatar: get_s(item, "avatar").map(str::to_string),
        role: get_parsed::<Role>(item, "role").unwrap_or_default(),
        created_at: get_time(item, "created_at")?,
        updated_at: get_time(item, "updated_at")?,
    })
}

/// Key of the uniqueness claim for a username. Usernames compare
/// case-insensitively.
pub fn username_identity(username: &str) -> String {
    format!("username#{}", username.to_lowercase())
}

pub fn email_identity(email: &str) -> String {
    format!("email#{email}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditPatch;
    use crate::ledger::VoteType;
    use crate::render::{HexColor, ImageFilter, TextEffect};
    use chrono::SubsecRound;

    fn sample_meme() -> Meme {
        let design = EditState::default().merge(&EditPatch {
            title: Some("Distracted".into()),
            top_text: Some("me".into()),
            top_text_size: Some(64),
            bottom_text_color: Some(HexColor::rgb(0xff, 0xd7, 0x00)),
            top_text_effect: Some(TextEffect::Rotate(-15.0)),
            image_filter: Some(ImageFilter::Grayscale(1.0)),
            top_text_position: Some(0.25),
            ..EditPatch::default()
        });
        let now = Utc::now().trunc_subsecs(3);
        let image_url = Some("https://i.imgflip.com/1ur9b0.jpg".to_string());
        let mut meme = Meme::new(design, image_url, None, false, Some(Uuid::new_v4()), now);
        meme.votes.cast(Uuid::new_v4(), VoteType::Up);
        meme.votes.cast(Uuid::new_v4(), VoteType::Down);
        meme.comments.append(Comment::new(Uuid::new_v4(), "lol", now).unwrap());
        meme.views = 12;
        meme
    }

    #[test]
    fn meme_survives_the_item_form() {
        let meme = sample_meme();
        let item = meme_to_item(&meme);
        assert_eq!(item_to_meme(&item), Some(meme));
    }

    #[test]
    fn empty_vote_sets_are_omitted() {
        let meme = Meme::new(EditState::default(), None, None, true, None, Utc::now());
        let item = meme_to_item(&meme);
        assert!(!item.contains_key("upvotes"));
        assert!(!item.contains_key("creator_id"));
        let back = item_to_meme(&item).unwrap();
        assert_eq!(back.votes.upvote_count(), 0);
        assert!(back.creator_id.is_none());
    }

    #[test]
    fn corrupt_color_fails_parsing() {
        let mut item = meme_to_item(&sample_meme());
        item.insert("top_text_color".into(), s("chartreuse"));
        assert!(item_to_meme(&item).is_none());
    }

    #[test]
    fn identities_are_normalized() {
        assert_eq!(username_identity("DogeLord"), "username#dogelord");
        assert_eq!(email_identity("a@b.co"), "email#a@b.co");
    }
}
