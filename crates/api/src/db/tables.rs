//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Username,
    ApiKey,
    IsAdmin,
    CreatedAt,
}

#[derive(Iden)]
pub enum Categories {
    Table,
    Id,
    Name,
    Position,
    OwnerId,
}

#[derive(Iden)]
pub enum Projects {
    Table,
    Id,
    CategoryId,
    Name,
    StartDate,
    DueDate,
    Priority,
    Position,
    OwnerId,
}

#[derive(Iden)]
pub enum Tasks {
    Table,
    Id,
    ProjectId,
    Name,
    StartDate,
    DueDate,
    Priority,
    Position,
    Completed,
    OwnerId,
}

#[derive(Iden)]
pub enum ShareGrants {
    Table,
    Id,
    ProjectId,
    OwnerId,
    Collaborator,
    Token,
    CreatedAt,
    ExpiresAt,
    RevokedAt,
}
