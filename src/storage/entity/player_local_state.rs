use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "player_local_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub game_id: String,
    pub table_id: String,
    pub payin_tx: String,
    pub player_id: i32,
    /// CSV of decoded card values, `-1` for undecoded slots.
    pub decoded_cards: String,
    pub cards_decoded_count: i32,
    pub last_card_id: i32,
    pub last_game_state: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
