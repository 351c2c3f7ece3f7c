#[cfg(test)]
mod tests {
    use quarry::{Entity, FromRow, TableRef, Value, map_row};
    use rust_decimal::Decimal;
    use time::{Date, macros::date};

    #[derive(Entity, Debug, Clone, PartialEq)]
    #[quarry(schema = "sales", table = "Orders", database = "archive")]
    struct Order {
        #[quarry(key, identity)]
        id: i64,
        #[quarry(name = "Reference")]
        code: String,
        note: Option<String>,
        #[quarry(type = "DECIMAL(12,2)")]
        total: Decimal,
        _placed: Date,
    }

    #[derive(Entity, Debug, Clone, PartialEq)]
    #[quarry(user_defined_table = "dbo.LineRow")]
    struct Line {
        #[quarry(key)]
        order_id: i64,
        #[quarry(key)]
        position: i16,
        quantity: u8,
    }

    fn order() -> Order {
        Order {
            id: 7,
            code: "A-7".into(),
            note: None,
            total: Decimal::new(1999, 2),
            _placed: date!(2024 - 05 - 01),
        }
    }

    #[test]
    fn order_metadata() {
        let metadata = Order::metadata();
        assert_eq!(metadata.entity_name, "Order");
        assert_eq!(metadata.table, TableRef::new("sales", "Orders"));
        assert_eq!(metadata.database.as_deref(), Some("archive"));
        assert_eq!(metadata.user_defined_table, None);

        let columns = &metadata.columns;
        assert_eq!(
            columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            ["Id", "Reference", "Note", "Total", "Placed"]
        );
        assert!(matches!(columns[0].value, Value::Int64(None)));
        assert!(matches!(columns[1].value, Value::Varchar(None)));
        assert!(matches!(columns[2].value, Value::Varchar(None)));
        assert!(matches!(columns[3].value, Value::Decimal(None, ..)));
        assert!(matches!(columns[4].value, Value::Date(None)));
        assert!(columns[0].primary_key);
        assert!(columns[0].identity);
        assert!(!columns[1].primary_key);
        assert!(!columns[1].nullable);
        assert!(columns[2].nullable);
        assert_eq!(columns[3].column_type.as_deref(), Some("DECIMAL(12,2)"));
        assert_eq!(columns[4].column_type, None);
        assert_eq!(metadata.insertable().count(), 4);
    }

    #[test]
    fn composite_key() {
        let metadata = Line::metadata();
        assert_eq!(metadata.table, TableRef::new("", "Line"));
        assert_eq!(metadata.database, None);
        assert_eq!(metadata.user_defined_table.as_deref(), Some("dbo.LineRow"));
        assert_eq!(
            metadata
                .primary_key()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            ["OrderId", "Position"]
        );
        assert!(matches!(metadata.columns[2].value, Value::UInt8(None)));
        assert!(std::ptr::eq(metadata, Line::metadata()));
    }

    #[test]
    fn row_round_trip() {
        let order = order();
        let row = order.row();
        assert_eq!(row.len(), Order::width());
        assert_eq!(row[0], Value::Int64(Some(7)));
        assert_eq!(row[1], Value::Varchar(Some("A-7".into())));
        assert!(row[2].is_null());
        assert_eq!(map_row::<Order>(row).expect("Order is mapped back"), order);
    }

    #[test]
    fn short_row_is_rejected() {
        let row: Box<[Value]> = Box::new([Value::Int64(Some(1)), Value::Int16(Some(2))]);
        assert!(map_row::<Line>(row).is_err());
    }

    #[test]
    fn tuples_and_scalars() {
        let row: Box<[Value]> = Box::new([
            Value::Varchar(Some("Ada".into())),
            Value::Int64(Some(3)),
        ]);
        let (name, count) = map_row::<(String, i64)>(row).expect("The tuple is mapped");
        assert_eq!(name, "Ada");
        assert_eq!(count, 3);
        assert_eq!(<(String, i64)>::width(), 2);
        let row: Box<[Value]> = Box::new([Value::Null]);
        assert_eq!(map_row::<Option<i32>>(row).expect("Null maps to None"), None);
    }
}
